//! MessageSource trait - 入站遥测消息来源
//!
//! 回放文件、模拟车队或真实消息总线都实现此 trait，由 ingestion 统一注册和启停。

use std::sync::Arc;

use crate::InboundMessage;

/// Message callback
///
/// 来源每产生一条消息就调用一次，回调内部不得阻塞。
pub type MessageCallback = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Telemetry message source
pub trait MessageSource: Send + Sync {
    fn source_id(&self) -> &str;

    /// Start producing messages into `callback`
    ///
    /// Idempotent while running.
    fn listen(&self, callback: MessageCallback);

    fn stop(&self);

    /// `false` once stopped or once a finite source is exhausted
    fn is_running(&self) -> bool;
}
