//! # Observability
//!
//! 日志与指标的统一入口。
//!
//! - `tracing` 订阅器：JSON / Pretty / Compact，`RUST_LOG` 优先于命令行级别
//! - Prometheus 导出器（`metrics` facade 的全局 recorder）
//! - 每条上报处理结果的计数与运行统计，见 [`metrics`]
//!
//! ```ignore
//! let config = ObservabilityConfig::default().with_verbosity(1, false);
//! observability::init_with_config(config)?;
//!
//! let mut aggregator = PipelineMetricsAggregator::new();
//! metrics::record_report_processed(&obs);
//! aggregator.update(&obs);
//! println!("{}", aggregator.summary());
//! ```

pub mod metrics;

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_active_vehicles, record_ingest_latency_ms, record_report_dispatched,
    record_report_normalized, record_report_processed, MetricsSummary,
    PipelineMetricsAggregator, ReportObservation, RunningStats, StatsSummary,
};

/// Prometheus listener port used when nothing else is configured
pub const DEFAULT_METRICS_PORT: u16 = 9000;

/// Log output shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// 结构化 JSON，附带 target / 线程 / 源码位置
    #[default]
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// `None` disables the exporter
    pub metrics_port: Option<u16>,
    /// Directive used when `RUST_LOG` is unset, e.g. `info` or `debug,map_matcher=trace`
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: Some(DEFAULT_METRICS_PORT),
            default_log_level: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// `-q` wins over `-v`; one `-v` is debug, more is trace
    pub fn with_verbosity(mut self, verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        self.default_log_level = level.to_string();
        self
    }

    /// 端口 0 关闭导出器
    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = (port != 0).then_some(port);
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_log_level))
    }
}

/// Tracing with the default config plus the exporter on [`DEFAULT_METRICS_PORT`]
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// Install the global subscriber and, when a port is set, the Prometheus recorder
///
/// 全局 subscriber 只能安装一次，重复调用返回错误。
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let format_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(format_layer)
        .try_init()
        .context("tracing subscriber already installed")?;

    if let Some(port) = config.metrics_port {
        install_exporter(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        level = %config.default_log_level,
        "Observability ready"
    );
    Ok(())
}

/// Only the Prometheus recorder, for callers whose tracing is already set up
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_exporter(port)
}

fn install_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start Prometheus exporter on {addr}"))?;
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}
