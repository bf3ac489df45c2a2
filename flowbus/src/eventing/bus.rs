//! 事件总线（EventBus）
//!
//! 持有唯一的 `Registry`，对外提供订阅/退订与两种分发模式：
//! - `publish`：在调用线程内按快照顺序逐个调用 handler，返回 `DispatchResult`；
//! - `publish_async`：为每个 handler 调度一次独立调用（阻塞线程池），
//!   以有界并发执行，返回可等待/可取消的 `CompletionToken`。
//!
//! 两种模式下单个 handler 的错误或 panic 都被隔离记录，不影响其他 handler。
//! 生命周期：Active → Closed（`close`，单向），关闭后所有操作返回 `BusClosed`；
//! 关闭前已发起的异步分发不受影响，其句柄仍可等待结果。
//!
use super::dispatch::{self, Outcome};
use super::{
    CompletionToken, DispatchResult, EventHandler, FailureSink, FnHandler, HandlerError,
    HandlerFailure, Registry, Subscriber, SubscriptionHandle, TracingSink,
};
use crate::error::{BusError, BusResult};
use crate::event::{Event, EventType};
use bon::Builder;
use futures_util::{StreamExt, future, stream};
use std::collections::BTreeMap;
use std::{fmt, sync::Arc, time::Duration};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::SendError};
use tokio::sync::oneshot;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};

/// 事件总线配置
#[derive(Clone, Copy, Debug)]
pub struct EventBusConfig {
    /// 单次异步分发的 handler 并发上限（0 视为 1）
    pub handler_concurrency: usize,
    /// 单次异步分发的等待时限；届时未完成（含未开始）的 handler 记为超时，
    /// 但仍在后台执行完毕
    pub dispatch_timeout: Option<Duration>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            handler_concurrency: 8,
            dispatch_timeout: None,
        }
    }
}

fn default_sink() -> Arc<dyn FailureSink> {
    Arc::new(TracingSink)
}

/// 进程内发布/订阅总线
#[derive(Builder)]
pub struct EventBus {
    #[builder(default)]
    config: EventBusConfig,
    #[builder(default = default_sink())]
    sink: Arc<dyn FailureSink>,
    #[builder(skip)]
    registry: Registry,
    #[builder(skip)]
    tracker: TaskTracker,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EventBus {
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 以弱引用订阅，见 [`Registry::subscribe`]
    ///
    /// 总线不持有 `handler`：调用方释放最后一个 `Arc` 后订阅随之失效，
    /// 因此 `bus.subscribe(ty, &Arc::new(h))` 得到的订阅永远不会触发。
    /// 需要由总线保活时使用 [`EventBus::subscribe_retained`] 或 [`EventBus::subscribe_fn`]。
    pub fn subscribe<H: EventHandler>(
        &self,
        event_type: impl Into<EventType>,
        handler: &Arc<H>,
    ) -> BusResult<SubscriptionHandle> {
        self.registry.subscribe(event_type, handler)
    }

    /// 以强引用订阅：handler 由总线保活直到退订或关闭
    pub fn subscribe_retained(
        &self,
        event_type: impl Into<EventType>,
        handler: Arc<dyn EventHandler>,
    ) -> BusResult<SubscriptionHandle> {
        self.registry.subscribe_retained(event_type, handler)
    }

    /// 订阅闭包；闭包由总线保活直到退订或关闭，每次调用都是一个新的订阅
    pub fn subscribe_fn<F>(
        &self,
        event_type: impl Into<EventType>,
        name: impl Into<String>,
        f: F,
    ) -> BusResult<SubscriptionHandle>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry
            .subscribe_retained(event_type, Arc::new(FnHandler::new(name, f)))
    }

    pub fn subscribe_many<H, I, T>(
        &self,
        event_types: I,
        handler: &Arc<H>,
    ) -> BusResult<Vec<SubscriptionHandle>>
    where
        H: EventHandler,
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.registry.subscribe_many(event_types, handler)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> BusResult<bool> {
        self.registry.unsubscribe(handle)
    }

    pub fn handlers_for(&self, event_type: impl AsRef<str>) -> BusResult<Vec<Subscriber>> {
        self.registry.handlers_for(event_type)
    }

    /// 同步发布：在当前线程按订阅顺序调用全部 handler
    pub fn publish(&self, event: Event) -> BusResult<DispatchResult> {
        let subscribers = self.registry.handlers_for(event.event_type())?;
        let mut result = DispatchResult::empty(event.event_type().clone());

        for subscriber in &subscribers {
            result.record(Outcome::Done(dispatch::invoke(subscriber, &event)));
        }

        log_result(&result);
        Ok(result)
    }

    /// 异步发布：调度全部 handler 后立即返回完成句柄
    ///
    /// 需要处于 tokio 运行时中（无订阅者时除外）。
    pub fn publish_async(&self, event: Event) -> BusResult<CompletionToken> {
        let subscribers = self.registry.handlers_for(event.event_type())?;
        let event_type = event.event_type().clone();
        if subscribers.is_empty() {
            trace!(event_type = %event_type, "no subscribers");
            return Ok(CompletionToken::ready(DispatchResult::empty(event_type)));
        }

        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let config = self.config;
        let sink = self.sink.clone();
        let tracker = self.tracker.clone();
        let event = Arc::new(event);
        let token = cancel.clone();

        self.tracker.spawn_on(
            async move {
                let result = drive(subscribers, event, token, config, tracker, sink.clone()).await;
                log_result(&result);

                // 句柄已被丢弃：失败交给观测出口后丢弃
                if let Err(result) = tx.send(result) {
                    for failure in &result.failures {
                        sink.record(&result.event_type, failure);
                    }
                }
            },
            &runtime,
        );

        Ok(CompletionToken::new(event_type, cancel, rx))
    }

    /// 关闭总线并释放全部订阅；返回是否由本次调用完成关闭
    pub fn close(&self) -> bool {
        let closed = self.registry.close();
        if closed {
            self.tracker.close();
            debug!(in_flight = self.tracker.len(), "event bus closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    /// 等待本总线发起的全部异步分发结束（含超时后仍在后台执行的 handler）
    ///
    /// tracker 关闭后仍可登记新任务，此处不再重新打开，避免与 `close` 竞争。
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

/// 驱动一次异步分发
///
/// handler 的调度由独立的后台任务完成（同样登记在 tracker 上），本函数只负责收集结果：
/// 截止时间一到即停止等待，尚未完成的 handler（包括尚未开始的）记为超时，
/// 但它们仍在后台按并发上限继续执行，只有 `cancel` 能阻止其启动。
async fn drive(
    subscribers: Vec<Subscriber>,
    event: Arc<Event>,
    cancel: CancellationToken,
    config: EventBusConfig,
    tracker: TaskTracker,
    sink: Arc<dyn FailureSink>,
) -> DispatchResult {
    let event_type = event.event_type().clone();
    let mut result = DispatchResult::empty(event_type.clone());
    let mut pending: BTreeMap<u64, Subscriber> =
        subscribers.iter().map(|s| (s.id(), s.clone())).collect();
    let (tx, mut rx) = mpsc::unbounded_channel();

    tracker.spawn(
        stream::iter(subscribers)
            .map(move |subscriber| invoke_scheduled(subscriber, event.clone(), cancel.clone()))
            .buffer_unordered(config.handler_concurrency.max(1))
            .for_each(move |(id, outcome)| {
                // 收集方已超时离开：迟到的失败交给观测出口
                if let Err(SendError((_, Outcome::Done(Some(failure))))) = tx.send((id, outcome)) {
                    sink.record(&event_type, &failure);
                }
                future::ready(())
            }),
    );

    let collect = async {
        while let Some((id, outcome)) = rx.recv().await {
            pending.remove(&id);
            result.record(outcome);
        }
    };

    match config.dispatch_timeout {
        None => collect.await,
        Some(after) => {
            let finished = time::timeout(after, collect).await.is_ok();
            if !finished {
                while let Ok((id, outcome)) = rx.try_recv() {
                    pending.remove(&id);
                    result.record(outcome);
                }
                for subscriber in pending.values() {
                    result.record(Outcome::Done(Some(timed_out(subscriber, after))));
                }
            }
        }
    }

    // 订阅序号单调递增，按序号排序即恢复快照顺序
    result.failures.sort_by_key(|f| f.subscription);
    result
}

async fn invoke_scheduled(
    subscriber: Subscriber,
    event: Arc<Event>,
    cancel: CancellationToken,
) -> (u64, Outcome) {
    let id = subscriber.id();
    if cancel.is_cancelled() {
        return (id, Outcome::Skipped);
    }

    let job = {
        let subscriber = subscriber.clone();
        tokio::task::spawn_blocking(move || dispatch::invoke(&subscriber, &event))
    };

    let outcome = match job.await {
        Ok(failure) => Outcome::Done(failure),
        Err(err) => Outcome::Done(Some(HandlerFailure::new(
            &subscriber,
            HandlerError::Panicked {
                message: err.to_string(),
            },
        ))),
    };
    (id, outcome)
}

fn timed_out(subscriber: &Subscriber, after: Duration) -> HandlerFailure {
    HandlerFailure::new(subscriber, HandlerError::TimedOut { after })
}

fn log_result(result: &DispatchResult) {
    trace!(
        event_type = %result.event_type,
        invoked = result.invoked,
        skipped = result.skipped,
        failed = result.failures.len(),
        "dispatched"
    );
    for failure in &result.failures {
        debug!(
            event_type = %result.event_type,
            handler = %failure.handler,
            error = %failure.error,
            "handler failed"
        );
    }
}
