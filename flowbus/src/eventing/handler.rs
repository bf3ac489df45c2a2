//! 事件处理器（EventHandler）
//!
//! 订阅方实现的唯一能力：接收一个事件并返回处理结果。
//! 闭包可通过 `handler_fn` 适配为处理器。
//!
use crate::event::Event;
use std::fmt;

/// 事件处理器：处理已订阅类型的事件
///
/// 同步调用；异步分发时由总线调度到阻塞线程池执行，
/// 因此实现不需要也不应依赖异步运行时上下文。
pub trait EventHandler: Send + Sync + 'static {
    /// 处理事件，返回错误会被记录为该 handler 的失败，不影响其他 handler
    fn handle(&self, event: &Event) -> anyhow::Result<()>;

    /// 处理器名称（用于失败记录与日志）
    fn handler_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// 闭包适配器
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.f)(event)
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

/// 以名称与闭包构造处理器
pub fn handler_fn<F>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
{
    FnHandler::new(name, f)
}
