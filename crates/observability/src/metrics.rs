//! 管道指标收集模块
//!
//! 各阶段自身的计数器在所属 crate 内直接上报；这里负责编排层的指标，
//! 以及运行结束时打印的内存聚合统计。

use std::collections::BTreeMap;

use contracts::{FilterOutcome, MatchOutcome, TrafficLevel};
use metrics::{counter, gauge, histogram};

/// 一条上报处理完成后的观测值
///
/// 由调用方从 worker 的处理结果中提取，避免本模块依赖分发层。
#[derive(Debug, Clone, Copy)]
pub struct ReportObservation<'a> {
    pub filter: &'a FilterOutcome,
    pub matching: Option<&'a MatchOutcome>,
    /// 状态是否使用了过滤后的位置（未匹配或低置信度）
    pub fallback: bool,
    pub speed: Option<f64>,
    pub traffic: Option<(TrafficLevel, f64)>,
    pub store_failures: usize,
}

impl ReportObservation<'_> {
    fn position_label(&self) -> &'static str {
        match (self.filter, self.fallback) {
            (FilterOutcome::Rejected(_), _) => "rejected",
            (FilterOutcome::Accepted(_), true) => "filtered",
            (FilterOutcome::Accepted(_), false) => "matched",
        }
    }
}

/// 记录一条已处理上报
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_report_processed;
///
/// while let Some(outcome) = outcomes.recv().await {
///     record_report_processed(&observation(&outcome));
/// }
/// ```
pub fn record_report_processed(obs: &ReportObservation<'_>) {
    counter!(
        "tracker_reports_processed_total",
        "position" => obs.position_label()
    )
    .increment(1);

    if let Some((level, density)) = obs.traffic {
        gauge!("tracker_last_road_density").set(density);
        counter!("tracker_road_updates_total", "level" => level.as_str()).increment(1);
    }

    if obs.store_failures > 0 {
        counter!("tracker_reports_with_store_failures_total").increment(1);
    }
}

/// 记录 Normalizer 输出的上报
pub fn record_report_normalized(vehicle_type: &str) {
    counter!(
        "tracker_reports_normalized_total",
        "vehicle_type" => vehicle_type.to_string()
    )
    .increment(1);
}

/// 记录上报交给分发器
pub fn record_report_dispatched(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("tracker_reports_dispatched_total", "status" => status).increment(1);
}

/// 记录服务端接收到分发之间的延迟
pub fn record_ingest_latency_ms(latency_ms: f64) {
    histogram!("tracker_ingest_latency_ms").record(latency_ms);
}

/// 记录活跃车辆 worker 数
pub fn record_active_vehicles(count: usize) {
    gauge!("tracker_active_vehicles").set(count as f64);
}

/// 管道指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct PipelineMetricsAggregator {
    /// 处理完成的上报数
    pub total_reports: u64,

    /// 被过滤器拒绝的上报数
    pub rejected: u64,

    /// 使用匹配位置更新状态
    pub matched: u64,

    /// 使用过滤位置更新状态
    pub fallback: u64,

    /// 至少一次存储调用失败的上报数
    pub reports_with_store_failures: u64,

    /// 匹配置信度
    pub confidence_stats: RunningStats,

    /// 匹配距离
    pub distance_stats: RunningStats,

    /// 隐含速度
    pub speed_stats: RunningStats,

    /// 路段密度
    pub density_stats: RunningStats,

    /// 拒绝原因计数
    pub reject_reasons: BTreeMap<&'static str, u64>,

    /// 未匹配原因计数
    pub no_match_causes: BTreeMap<&'static str, u64>,

    /// 拥堵重算结果计数
    pub traffic_levels: BTreeMap<&'static str, u64>,
}

impl PipelineMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, obs: &ReportObservation<'_>) {
        self.total_reports += 1;

        if obs.store_failures > 0 {
            self.reports_with_store_failures += 1;
        }

        if let FilterOutcome::Rejected(reason) = obs.filter {
            self.rejected += 1;
            *self.reject_reasons.entry(reason.as_str()).or_insert(0) += 1;
            return;
        }

        match obs.matching {
            Some(MatchOutcome::Matched(m)) => {
                self.confidence_stats.push(m.confidence);
                self.distance_stats.push(m.distance);
            }
            Some(other) => {
                *self.no_match_causes.entry(other.as_str()).or_insert(0) += 1;
            }
            None => {}
        }

        if obs.fallback {
            self.fallback += 1;
        } else {
            self.matched += 1;
        }

        if let Some(speed) = obs.speed {
            self.speed_stats.push(speed);
        }

        if let Some((level, density)) = obs.traffic {
            self.density_stats.push(density);
            *self.traffic_levels.entry(level.as_str()).or_insert(0) += 1;
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_reports: self.total_reports,
            rejected: self.rejected,
            matched: self.matched,
            fallback: self.fallback,
            reports_with_store_failures: self.reports_with_store_failures,
            reject_rate: percent(self.rejected, self.total_reports),
            match_rate: percent(self.matched, self.total_reports - self.rejected),
            confidence: StatsSummary::from(&self.confidence_stats),
            match_distance: StatsSummary::from(&self.distance_stats),
            speed: StatsSummary::from(&self.speed_stats),
            density: StatsSummary::from(&self.density_stats),
            reject_reasons: self.reject_reasons.clone(),
            no_match_causes: self.no_match_causes.clone(),
            traffic_levels: self.traffic_levels.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_reports: u64,
    pub rejected: u64,
    pub matched: u64,
    pub fallback: u64,
    pub reports_with_store_failures: u64,
    /// 拒绝占全部上报的百分比
    pub reject_rate: f64,
    /// 匹配占通过过滤的上报的百分比
    pub match_rate: f64,
    pub confidence: StatsSummary,
    pub match_distance: StatsSummary,
    pub speed: StatsSummary,
    pub density: StatsSummary,
    pub reject_reasons: BTreeMap<&'static str, u64>,
    pub no_match_causes: BTreeMap<&'static str, u64>,
    pub traffic_levels: BTreeMap<&'static str, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pipeline Metrics Summary ===")?;
        writeln!(f, "Total reports: {}", self.total_reports)?;
        writeln!(
            f,
            "Rejected by filter: {} ({:.2}%)",
            self.rejected, self.reject_rate
        )?;
        writeln!(
            f,
            "Matched position: {} ({:.2}%)",
            self.matched, self.match_rate
        )?;
        writeln!(f, "Filtered position: {}", self.fallback)?;
        writeln!(
            f,
            "Reports with store failures: {}",
            self.reports_with_store_failures
        )?;
        writeln!(f, "Match confidence: {}", self.confidence)?;
        writeln!(f, "Match distance: {}", self.match_distance)?;
        writeln!(f, "Implied speed: {}", self.speed)?;
        writeln!(f, "Road density: {}", self.density)?;

        write_counts(f, "Reject reasons", &self.reject_reasons)?;
        write_counts(f, "No-match causes", &self.no_match_causes)?;
        write_counts(f, "Traffic levels", &self.traffic_levels)?;

        Ok(())
    }
}

fn write_counts(
    f: &mut std::fmt::Formatter<'_>,
    title: &str,
    counts: &BTreeMap<&'static str, u64>,
) -> std::fmt::Result {
    if !counts.is_empty() {
        writeln!(f, "{}:", title)?;
        for (label, count) in counts {
            writeln!(f, "  {}: {}", label, count)?;
        }
    }
    Ok(())
}

/// Frozen view of a [`RunningStats`]
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        let (min, max) = stats.range.unwrap_or_default();
        Self {
            count: stats.count,
            min,
            max,
            mean: stats.mean,
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return f.write_str("N/A");
        }
        write!(
            f,
            "mean {:.3} ± {:.3} in [{:.3}, {:.3}] over {}",
            self.mean, self.std_dev, self.min, self.max, self.count
        )
    }
}

/// Streaming mean / sample variance / range
///
/// Welford 递推，数值稳定，不保存样本。
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    /// 与均值之差的平方和
    m2: f64,
    range: Option<(f64, f64)>,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.range = Some(match self.range {
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
            None => (value, value),
        });
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// 0 when empty
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance, 0 below two samples
    pub fn variance(&self) -> f64 {
        match self.count {
            0 | 1 => 0.0,
            n => self.m2 / (n - 1) as f64,
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> Option<f64> {
        self.range.map(|(lo, _)| lo)
    }

    pub fn max(&self) -> Option<f64> {
        self.range.map(|(_, hi)| hi)
    }
}

impl Extend<f64> for RunningStats {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = Self::default();
        stats.extend(iter);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{MatchResult, Point, RejectReason, RoadNode};

    fn matched(confidence: f64, distance: f64) -> MatchOutcome {
        MatchOutcome::Matched(MatchResult {
            matched: Point::new(10.0, 10.0),
            road_id: Some("r1".into()),
            confidence,
            distance,
            projected: true,
            nearest_node: RoadNode::road(1, 10.0, 10.0, Some("r1")),
        })
    }

    #[test]
    fn test_running_stats() {
        let empty = RunningStats::default();
        assert_eq!(empty.min(), None);
        assert_eq!(empty.variance(), 0.0);

        let stats: RunningStats = [4.0, 1.0, 5.0, 2.0, 3.0].into_iter().collect();
        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert_eq!(stats.min(), Some(1.0));
        assert_eq!(stats.max(), Some(5.0));
        assert!((stats.variance() - 2.5).abs() < 1e-10);

        let summary = StatsSummary::from(&stats);
        assert_eq!(summary.to_string(), "mean 3.000 ± 1.581 in [1.000, 5.000] over 5");
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = PipelineMetricsAggregator::new();
        let accepted = FilterOutcome::Accepted(Point::new(10.0, 10.0));
        let rejected = FilterOutcome::Rejected(RejectReason::NoFix);
        let good = matched(0.8, 4.0);

        aggregator.update(&ReportObservation {
            filter: &accepted,
            matching: Some(&good),
            fallback: false,
            speed: Some(2.0),
            traffic: Some((TrafficLevel::Normal, 0.2)),
            store_failures: 0,
        });
        aggregator.update(&ReportObservation {
            filter: &accepted,
            matching: Some(&MatchOutcome::NoCandidates),
            fallback: true,
            speed: Some(4.0),
            traffic: None,
            store_failures: 1,
        });
        aggregator.update(&ReportObservation {
            filter: &rejected,
            matching: None,
            fallback: false,
            speed: None,
            traffic: None,
            store_failures: 0,
        });

        assert_eq!(aggregator.total_reports, 3);
        assert_eq!(aggregator.rejected, 1);
        assert_eq!(aggregator.matched, 1);
        assert_eq!(aggregator.fallback, 1);
        assert_eq!(aggregator.reports_with_store_failures, 1);
        assert_eq!(aggregator.reject_reasons.get("no_fix"), Some(&1));
        assert_eq!(aggregator.no_match_causes.get("no_candidates"), Some(&1));
        assert_eq!(aggregator.traffic_levels.get("NORMAL"), Some(&1));
        assert!((aggregator.speed_stats.mean() - 3.0).abs() < 1e-10);

        let summary = aggregator.summary();
        assert!((summary.match_rate - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let summary = MetricsSummary {
            total_reports: 200,
            rejected: 10,
            reject_rate: 5.0,
            confidence: StatsSummary {
                count: 150,
                min: 0.3,
                max: 0.99,
                mean: 0.7,
                std_dev: 0.1,
            },
            ..Default::default()
        };

        let output = format!("{}", summary);
        assert!(output.contains("Total reports: 200"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("Implied speed: N/A"));
    }
}
