//! Filter stages as pure functions.
//!
//! 每个阶段只看当前上报和窗口里的已接受点，不持有状态；
//! 状态（窗口）由 [`crate::LocationFilter`] 管理。

use contracts::{Point, RawReport, RejectReason};

/// Stage 1: validity gate
///
/// 无效标记、(0,0) 无定位、信号弱于下限（仅当设备上报了 RSSI）都会被丢弃。
pub fn validity_gate(report: &RawReport, rssi_floor: i32) -> Result<(), RejectReason> {
    if !report.valid {
        return Err(RejectReason::FlaggedInvalid);
    }
    if report.position().is_origin() {
        return Err(RejectReason::NoFix);
    }
    match report.rssi {
        Some(rssi) if rssi < rssi_floor => Err(RejectReason::WeakSignal { rssi }),
        _ => Ok(()),
    }
}

/// Stage 2: fixed-gain smoothing
///
/// `smoothed = last + K * (raw - last)`，按轴独立计算；没有历史点时直接返回原始点。
#[inline]
pub fn fixed_gain_smooth(raw: Point, last: Option<Point>, gain: f64) -> Point {
    match last {
        None => raw,
        Some(last) => Point::new(
            last.x + gain * (raw.x - last.x),
            last.y + gain * (raw.y - last.y),
        ),
    }
}

/// Stage 3: velocity plausibility gate
///
/// Returns the implied speed when plausible.
pub fn velocity_gate(
    smoothed: Point,
    last: Point,
    elapsed_secs: i64,
    max_speed: f64,
) -> Result<f64, RejectReason> {
    if elapsed_secs <= 0 {
        return Err(RejectReason::NonIncreasingTime { elapsed_secs });
    }
    let speed = smoothed.distance_to(&last) / elapsed_secs as f64;
    if speed > max_speed {
        return Err(RejectReason::ImplausibleSpeed { speed });
    }
    Ok(speed)
}

/// Stage 4: moving average of `current` and the given previous points
pub fn moving_average<I>(current: Point, previous: I) -> Point
where
    I: IntoIterator<Item = Point>,
{
    let (sum_x, sum_y, n) = previous
        .into_iter()
        .fold((current.x, current.y, 1usize), |(sx, sy, n), p| {
            (sx + p.x, sy + p.y, n + 1)
        });
    Point::new(sum_x / n as f64, sum_y / n as f64)
}
