//! Ingestion 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 消息标准化失败（topic / 解码 / id 不一致）
    #[error(transparent)]
    Normalize(#[from] ContractError),

    /// topic 不在任何订阅中
    #[error("topic '{topic}' is not subscribed")]
    Unsubscribed {
        /// 消息 topic
        topic: String,
    },

    /// 入站队列已满，消息被丢弃
    #[error("inbound queue full, message on '{topic}' dropped")]
    QueueFull {
        /// 消息 topic
        topic: String,
    },

    /// 通道已关闭
    #[error("inbound channel closed")]
    ChannelClosed,

    /// 回放文件读取失败
    #[error("failed to read replay file '{path}': {source}")]
    ReplayIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 回放文件某一行无法解析
    #[error("replay line {line}: {message}")]
    ReplayParse {
        /// 行号（从 1 开始）
        line: usize,
        message: String,
    },

    /// 消息源已在运行
    #[error("source {source_id} is already running")]
    AlreadyRunning {
        /// 消息源 ID
        source_id: String,
    },
}

impl IngestionError {
    pub fn replay_parse(line: usize, message: impl Into<String>) -> Self {
        Self::ReplayParse {
            line,
            message: message.into(),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
