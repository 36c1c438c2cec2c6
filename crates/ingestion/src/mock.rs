//! Mock 车队源
//!
//! 让 N 辆车沿给定折线匀速行驶并叠加均匀噪声，用于无真实设备时的联调。
//! 上报时间为模拟时钟（每个 tick 前进 1 秒），需要配合 `trust_device_clock = true`。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use contracts::{DevicePayload, InboundMessage, MessageCallback, MessageSource, Point};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::topic::TopicPattern;

/// Mock 车队配置
#[derive(Debug, Clone)]
pub struct MockFleetConfig {
    pub source_id: String,

    /// 车辆数量
    pub vehicles: usize,

    /// 发送频率 (Hz，真实时间)
    pub frequency_hz: f64,

    /// 行驶速度（单位/模拟秒）
    pub speed: f64,

    /// 均匀噪声幅度
    pub noise: f64,

    pub seed: u64,

    /// 折线路线，车辆按序号轮流分配
    pub routes: Vec<Vec<Point>>,

    /// 每辆车最多发送的 tick 数，`None` 表示一直运行
    pub max_ticks: Option<u64>,

    pub topic_pattern: String,
}

impl Default for MockFleetConfig {
    fn default() -> Self {
        Self {
            source_id: "mock_fleet".to_string(),
            vehicles: 5,
            frequency_hz: 10.0,
            speed: 5.0,
            noise: 1.5,
            seed: 42,
            routes: vec![vec![Point::new(10.0, 10.0), Point::new(200.0, 10.0)]],
            max_ticks: None,
            topic_pattern: "vehicle/+/info".to_string(),
        }
    }
}

/// Mock fleet source
pub struct MockFleetSource {
    config: MockFleetConfig,
    running: Arc<AtomicBool>,
}

impl MockFleetSource {
    pub fn new(config: MockFleetConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `esp32_*`, `car_*`, `truck_*` in turn
    pub fn vehicle_id(index: usize) -> String {
        match index % 3 {
            0 => format!("esp32_{index:02}"),
            1 => format!("car_{index:02}"),
            _ => format!("truck_{index:02}"),
        }
    }
}

/// Position and heading (degrees) after travelling `distance` along `route`, looping
fn point_along(route: &[Point], distance: f64) -> (Point, f64) {
    let segments: Vec<(Point, Point, f64)> = route
        .windows(2)
        .map(|w| (w[0], w[1], w[0].distance_to(&w[1])))
        .filter(|(_, _, len)| *len > 0.0)
        .collect();
    let total: f64 = segments.iter().map(|(_, _, len)| len).sum();

    let Some(&(first, ..)) = segments.first() else {
        return (route.first().copied().unwrap_or(Point::new(0.0, 0.0)), 0.0);
    };

    let mut remaining = distance.rem_euclid(total);
    for (start, end, len) in &segments {
        if remaining <= *len {
            let t = remaining / len;
            let heading = (end.y - start.y).atan2(end.x - start.x).to_degrees();
            return (
                Point::new(start.x + t * (end.x - start.x), start.y + t * (end.y - start.y)),
                heading.rem_euclid(360.0),
            );
        }
        remaining -= len;
    }
    (first, 0.0)
}

/// 八方位标签
fn compass_label(heading: f64) -> &'static str {
    const LABELS: [&str; 8] = ["东", "东北", "北", "西北", "西", "西南", "南", "东南"];
    let sector = ((heading.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
    LABELS[sector]
}

impl MessageSource for MockFleetSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn listen(&self, callback: MessageCallback) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let config = self.config.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            let pattern = match TopicPattern::parse(&config.topic_pattern) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "mock fleet has an invalid topic pattern");
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };
            let interval = Duration::from_secs_f64(1.0 / config.frequency_hz.max(0.001));
            let mut rng = StdRng::seed_from_u64(config.seed);
            let start_epoch = Utc::now().timestamp();
            let spacing = 15.0;
            let mut tick: u64 = 0;

            debug!(
                source_id = %config.source_id,
                vehicles = config.vehicles,
                frequency_hz = config.frequency_hz,
                "mock fleet started"
            );

            while running.load(Ordering::Relaxed) && config.max_ticks.map_or(true, |max| tick < max) {
                for index in 0..config.vehicles {
                    let route = match config.routes.len() {
                        0 => &[][..],
                        n => config.routes[index % n].as_slice(),
                    };
                    let traveled = index as f64 * spacing + config.speed * tick as f64;
                    let (truth, heading) = point_along(route, traveled);
                    let noise = config.noise.abs();

                    let vehicle_id = Self::vehicle_id(index);
                    let payload = DevicePayload {
                        vehicle_id: Some(vehicle_id.clone()),
                        vehicle_type: None,
                        valid: true,
                        x: truth.x + rng.random_range(-noise..=noise),
                        y: truth.y + rng.random_range(-noise..=noise),
                        // 设备上报分米
                        distance: config.speed * tick as f64 * 10.0,
                        angle: heading,
                        direction: Some(compass_label(heading).to_string()),
                        timestamp: Some(start_epoch + tick as i64),
                        events: Some(0),
                        rssi: Some(rng.random_range(-90..=-40)),
                    };

                    match serde_json::to_vec(&payload) {
                        Ok(bytes) => callback(InboundMessage::new(pattern.topic_for(&vehicle_id), bytes)),
                        Err(e) => trace!(error = %e, "mock payload encode failed"),
                    }
                }

                tick += 1;
                trace!(source_id = %config.source_id, tick, "mock tick sent");
                tokio::time::sleep(interval).await;
            }

            running.store(false, Ordering::SeqCst);
            debug!(source_id = %config.source_id, ticks = tick, "mock fleet stopped");
        });
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
