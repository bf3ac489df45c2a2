//! 分发结果与隔离调用
//!
//! 每次 handler 调用都包在 `catch_unwind` 边界内：返回的错误与 panic
//! 都被转换为一条 `HandlerFailure`，不会传播到发布方或其他 handler。
//!
use crate::event::{Event, EventType};
use crate::eventing::Subscriber;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use thiserror::Error;

/// 单个 handler 的失败原因
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Failed(anyhow::Error),
    #[error("handler panicked: {message}")]
    Panicked { message: String },
    #[error("handler timed out after {after:?}")]
    TimedOut { after: Duration },
}

/// 一条失败记录：哪个订阅、哪个 handler、因何失败
#[derive(Debug)]
pub struct HandlerFailure {
    pub subscription: u64,
    pub handler: String,
    pub error: HandlerError,
}

impl HandlerFailure {
    pub(crate) fn new(subscriber: &Subscriber, error: HandlerError) -> Self {
        Self {
            subscription: subscriber.id(),
            handler: subscriber.name().to_string(),
            error,
        }
    }
}

/// 一次发布的结果
///
/// `invoked` 为已交付执行的 handler 数（含失败与超时的），`skipped` 为异步分发中
/// 因取消而未启动的数量。成功即 `failures` 为空。
#[derive(Debug)]
pub struct DispatchResult {
    pub event_type: EventType,
    pub invoked: usize,
    pub skipped: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchResult {
    pub(crate) fn empty(event_type: EventType) -> Self {
        Self {
            event_type,
            invoked: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Done(None) => self.invoked += 1,
            Outcome::Done(Some(failure)) => {
                self.invoked += 1;
                self.failures.push(failure);
            }
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

/// 单次调用的结局
pub(crate) enum Outcome {
    /// 已执行（可能失败）
    Done(Option<HandlerFailure>),
    /// 因取消而未启动
    Skipped,
}

/// 在隔离边界内调用 handler
pub(crate) fn invoke(subscriber: &Subscriber, event: &Event) -> Option<HandlerFailure> {
    let result = catch_unwind(AssertUnwindSafe(|| subscriber.handler().handle(event)));

    let error = match result {
        Ok(Ok(())) => return None,
        Ok(Err(err)) => HandlerError::Failed(err),
        Err(panic) => HandlerError::Panicked {
            message: panic_message(&*panic),
        },
    };
    Some(HandlerFailure::new(subscriber, error))
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
