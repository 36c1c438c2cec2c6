//! Per-vehicle location filter.
//!
//! 窗口保存最近接受的**原始**上报（位置 + 时间戳），平滑与速度门限都以窗口最后一个点为参考。
//! 窗口只存在于内存中，进程重启后第一点视为该车首次观测。

use std::fmt;

use contracts::{FilterConfig, FilterOutcome, Point, RawReport, RejectReason};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, trace};

use crate::stages;

/// One accepted raw point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEntry {
    pub position: Point,
    pub timestamp: i64,
}

/// Per-filter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub accepted: u64,
    pub rejected: u64,
    /// 窗口满时被挤出的点
    pub evicted: u64,
}

/// Stateful denoiser for a single vehicle
///
/// 必须串行调用：窗口和速度门限假设时间戳单调递增。
pub struct LocationFilter {
    window: HeapRb<WindowEntry>,
    gain: f64,
    rssi_floor: i32,
    max_speed: f64,
    /// 滑动平均中参与的历史点数（窗口大小 - 1）
    average_history: usize,
    stats: FilterStats,
}

impl fmt::Debug for LocationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationFilter")
            .field("len", &self.window.occupied_len())
            .field("gain", &self.gain)
            .field("stats", &self.stats)
            .finish()
    }
}

impl LocationFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            window: HeapRb::new(config.window_capacity.max(1)),
            gain: config.gain(),
            rssi_floor: config.rssi_floor,
            max_speed: config.max_speed,
            average_history: config.moving_average_window.saturating_sub(1),
            stats: FilterStats::default(),
        }
    }

    /// Run all stages on one report
    ///
    /// On acceptance the raw report is committed to the window; on rejection the window is untouched.
    pub fn process(&mut self, report: &RawReport) -> FilterOutcome {
        match self.evaluate(report) {
            Ok(position) => {
                self.commit(WindowEntry {
                    position: report.position(),
                    timestamp: report.timestamp,
                });
                self.stats.accepted += 1;
                trace!(
                    vehicle_id = %report.vehicle_id,
                    x = position.x,
                    y = position.y,
                    "Report accepted"
                );
                FilterOutcome::Accepted(position)
            }
            Err(reason) => {
                self.stats.rejected += 1;
                debug!(
                    vehicle_id = %report.vehicle_id,
                    reason = reason.as_str(),
                    "Report dropped by filter"
                );
                FilterOutcome::Rejected(reason)
            }
        }
    }

    fn evaluate(&self, report: &RawReport) -> Result<Point, RejectReason> {
        stages::validity_gate(report, self.rssi_floor)?;

        let last = self.last();
        let smoothed = stages::fixed_gain_smooth(report.position(), last.map(|e| e.position), self.gain);

        if let Some(last) = last {
            stages::velocity_gate(
                smoothed,
                last.position,
                report.timestamp - last.timestamp,
                self.max_speed,
            )?;
        }

        Ok(stages::moving_average(smoothed, self.recent(self.average_history)))
    }

    fn commit(&mut self, entry: WindowEntry) {
        if self.window.is_full() {
            let _ = self.window.try_pop();
            self.stats.evicted += 1;
        }
        let _ = self.window.try_push(entry);
    }

    /// Most recently accepted point
    pub fn last(&self) -> Option<WindowEntry> {
        self.window.iter().last().copied()
    }

    /// Up to `n` most recent accepted positions, oldest first
    fn recent(&self, n: usize) -> impl Iterator<Item = Point> + '_ {
        let skip = self.window.occupied_len().saturating_sub(n);
        self.window.iter().skip(skip).map(|e| e.position)
    }

    pub fn len(&self) -> usize {
        self.window.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    /// Forget the window, next report is treated as a first observation
    pub fn reset(&mut self) {
        while self.window.try_pop().is_some() {}
    }
}
