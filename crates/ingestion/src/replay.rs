//! 回放源：按行读取 JSON Lines 记录 `{ "topic": ..., "payload": {...} }`
//!
//! `payload` 为字符串时按原文发送，可用于回放畸形消息。
//! 给定速度倍率时按负载中 `timestamp` 的差值节流，否则尽快发送。

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{InboundMessage, MessageCallback, MessageSource};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{IngestionError, Result};

#[derive(Debug, Deserialize)]
struct ReplayLine {
    topic: String,
    payload: serde_json::Value,
}

/// One recorded message
#[derive(Debug, Clone)]
pub struct ReplayEntry {
    pub topic: String,
    pub payload: Bytes,
    timestamp: Option<i64>,
}

/// Replays a recorded message file
pub struct ReplaySource {
    source_id: String,
    entries: Arc<Vec<ReplayEntry>>,
    speed: Option<f64>,
    running: Arc<AtomicBool>,
}

impl ReplaySource {
    pub fn from_path(path: &Path, speed: Option<f64>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| IngestionError::ReplayIo {
            path: path.display().to_string(),
            source,
        })?;
        let mut source = Self::parse(&content, speed)?;
        source.source_id = format!("replay:{}", path.display());
        Ok(source)
    }

    /// Blank lines and `#` comments are skipped
    pub fn parse(content: &str, speed: Option<f64>) -> Result<Self> {
        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record: ReplayLine = serde_json::from_str(line)
                .map_err(|e| IngestionError::replay_parse(idx + 1, e.to_string()))?;

            let timestamp = record.payload.get("timestamp").and_then(|v| v.as_i64());
            let payload = match record.payload {
                serde_json::Value::String(raw) => Bytes::from(raw),
                other => Bytes::from(other.to_string()),
            };
            entries.push(ReplayEntry {
                topic: record.topic,
                payload,
                timestamp,
            });
        }

        Ok(Self {
            source_id: "replay".to_string(),
            entries: Arc::new(entries),
            speed: speed.filter(|s| *s > 0.0),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn delay(speed: Option<f64>, prev: Option<i64>, next: Option<i64>) -> Option<Duration> {
        let speed = speed?;
        let gap = next? - prev?;
        (gap > 0).then(|| Duration::from_secs_f64(gap as f64 / speed))
    }
}

impl MessageSource for ReplaySource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn listen(&self, callback: MessageCallback) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let entries = self.entries.clone();
        let running = self.running.clone();
        let speed = self.speed;
        let source_id = self.source_id.clone();

        tokio::spawn(async move {
            debug!(source_id = %source_id, entries = entries.len(), "replay started");
            let mut prev_ts = None;
            let mut sent = 0usize;

            for entry in entries.iter() {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                match Self::delay(speed, prev_ts, entry.timestamp) {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => tokio::task::yield_now().await,
                }
                prev_ts = entry.timestamp.or(prev_ts);

                callback(InboundMessage::new(entry.topic.clone(), entry.payload.clone()));
                sent += 1;
                trace!(source_id = %source_id, topic = %entry.topic, "replayed message");
            }

            running.store(false, Ordering::SeqCst);
            debug!(source_id = %source_id, sent, "replay finished");
        });
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
