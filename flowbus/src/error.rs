//! 事件总线统一错误定义
//!
//! 仅覆盖生命周期误用（订阅参数非法、总线已关闭）、发布契约校验、运行时缺失与负载序列化，
//! handler 自身的失败不在此列，见 `eventing::HandlerError`。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    // --- 订阅 ---
    #[error("invalid subscription: {reason}")]
    InvalidSubscription { reason: String },

    // --- 发布 ---
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },
    #[error("invalid payload for {event_type}: {reason}")]
    InvalidPayload { event_type: String, reason: String },
    #[error("undeclared publication: {event_type}")]
    UndeclaredPublication { event_type: String },

    // --- 生命周期 ---
    #[error("event bus closed")]
    BusClosed,

    // --- 异步分发 ---
    #[error("no tokio runtime available for asynchronous dispatch")]
    NoRuntime,
    #[error("dispatch aborted: {reason}")]
    DispatchAborted { reason: String },

    // --- 负载序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

impl BusError {
    pub fn invalid_subscription(reason: impl Into<String>) -> Self {
        BusError::InvalidSubscription {
            reason: reason.into(),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        BusError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn dispatch_aborted(reason: impl Into<String>) -> Self {
        BusError::DispatchAborted {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type BusResult<T> = Result<T, BusError>;
