//! 异步分发完成句柄（CompletionToken）
//!
//! - `join`：等待所有已调度 handler 结束并取得聚合结果；
//! - `cancel`：尚未启动的 handler 不再启动，已启动的照常执行完毕；
//! - `detach` / 直接丢弃：fire-and-forget，失败交由 `FailureSink` 记录。
//!
use crate::error::{BusError, BusResult};
use crate::event::EventType;
use crate::eventing::DispatchResult;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[must_use = "dropping the token detaches the dispatch; call `detach()` to make that explicit"]
#[derive(Debug)]
pub struct CompletionToken {
    event_type: EventType,
    cancel: CancellationToken,
    rx: oneshot::Receiver<DispatchResult>,
}

impl CompletionToken {
    pub(crate) fn new(
        event_type: EventType,
        cancel: CancellationToken,
        rx: oneshot::Receiver<DispatchResult>,
    ) -> Self {
        Self {
            event_type,
            cancel,
            rx,
        }
    }

    /// 已经完成的分发（无订阅者时使用）
    pub(crate) fn ready(result: DispatchResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let event_type = result.event_type.clone();
        // 接收端仍在本函数内，发送不会失败
        let _ = tx.send(result);
        Self::new(event_type, CancellationToken::new(), rx)
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 等待分发结束
    pub async fn join(self) -> BusResult<DispatchResult> {
        self.rx
            .await
            .map_err(|_| BusError::dispatch_aborted("dispatch task ended without a result"))
    }

    pub fn detach(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_token_resolves_immediately() {
        let token = CompletionToken::ready(DispatchResult::empty(EventType::new("x")));
        assert_eq!(token.event_type().as_str(), "x");
        let result = token.join().await.unwrap();
        assert_eq!(result.invoked, 0);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn lost_sender_is_reported() {
        let (tx, rx) = oneshot::channel::<DispatchResult>();
        drop(tx);
        let token = CompletionToken::new(EventType::new("x"), CancellationToken::new(), rx);
        assert!(matches!(
            token.join().await,
            Err(BusError::DispatchAborted { .. })
        ));
    }

    #[test]
    fn cancel_flag() {
        let token = CompletionToken::ready(DispatchResult::empty(EventType::new("x")));
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.detach();
    }
}
