//! 进程内事件分发基础库（flowbus）
//!
//! 让彼此独立的组件按事件类型登记兴趣、在事件发布时得到通知，
//! 发布方与订阅方互不知晓：
//! - 事件模型（`event`）：`EventType` 与携带 JSON 负载的不可变 `Event`；
//! - 事件系统（`eventing`）：订阅表、总线、同步/异步分发与失败隔离；
//! - 常用订阅者（`subscribers`）：日志上报、事件追踪与日志装饰器。
//!
//! 典型用法：
//! 1. 构造 `EventBus`（`EventBus::default()` 或 `EventBus::builder()`）并在需要处传递引用；
//! 2. 为事件类型订阅 `EventHandler` 或闭包，保留返回的 `SubscriptionHandle` 以便退订；
//! 3. 通过 `publish` 同步分发，或 `publish_async` 取得 `CompletionToken` 后等待结果；
//! 4. 结束时 `close` 总线，必要时 `drain` 等待在途的异步分发。
//!
pub mod error;
pub mod event;
pub mod eventing;
pub mod subscribers;

pub use error::{BusError, BusResult};
pub use event::{Event, EventType};
pub use eventing::{
    CompletionToken, DispatchResult, EventBus, EventBusConfig, EventHandler, FailureSink,
    HandlerError, HandlerFailure, Publication, Publisher, Registry, Subscriber,
    SubscriptionGroup, SubscriptionHandle, TracingSink, handler_fn,
};
