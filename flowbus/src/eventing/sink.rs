//! 失败观测出口（FailureSink）
//!
//! 异步分发的完成句柄被丢弃（fire-and-forget）时，handler 失败无人接收，
//! 由总线逐条交给此出口后丢弃。
//!
use crate::event::EventType;
use crate::eventing::HandlerFailure;
use tracing::warn;

pub trait FailureSink: Send + Sync {
    fn record(&self, event_type: &EventType, failure: &HandlerFailure);
}

/// 默认出口：通过 `tracing` 输出告警日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn record(&self, event_type: &EventType, failure: &HandlerFailure) {
        warn!(
            event_type = %event_type,
            subscription = failure.subscription,
            handler = %failure.handler,
            error = %failure.error,
            "unobserved handler failure"
        );
    }
}
