//! 事件子系统（eventing）
//!
//! 进程内发布/订阅的核心：
//! - `Registry`：`EventType -> [handler]` 的有序、线程安全订阅表；
//! - `EventBus`：持有唯一 `Registry`，提供同步与异步两种分发模式；
//! - `EventHandler`：订阅方实现的处理能力；
//! - `DispatchResult` / `CompletionToken`：分发结果与异步完成句柄；
//! - `FailureSink`：fire-and-forget 分发中无人接收的失败的观测出口；
//! - `Publication` / `Publisher`：类型化发布点与只发布已声明事件的发布方；
//! - `SubscriptionGroup`：整体加入、整体退订的一组订阅。
//!
//! 事件仅在进程生命周期内有效，不做持久化、重试与跨进程投递。
//!
pub mod bus;
pub mod completion;
pub mod dispatch;
pub mod group;
pub mod handler;
pub mod publication;
pub mod registry;
pub mod sink;

pub use bus::{EventBus, EventBusConfig};
pub use completion::CompletionToken;
pub use dispatch::{DispatchResult, HandlerError, HandlerFailure};
pub use group::SubscriptionGroup;
pub use handler::{EventHandler, FnHandler, handler_fn};
pub use publication::{Publication, Publisher};
pub use registry::{Registry, Subscriber, SubscriptionHandle};
pub use sink::{FailureSink, TracingSink};
