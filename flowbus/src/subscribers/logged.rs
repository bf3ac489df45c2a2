//! 日志装饰器（Logged）
//!
//! 包装任意 handler：每次处理前以指定级别写一条 `[前缀] 事件` 日志，再交给内部 handler。
//!
use crate::event::Event;
use crate::eventing::EventHandler;
use tracing::{Level, debug, error, info, trace, warn};

pub struct Logged<H> {
    inner: H,
    level: Level,
    prefix: String,
}

impl<H: EventHandler> Logged<H> {
    /// 默认 INFO 级别、前缀 `Event`
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            level: Level::INFO,
            prefix: "Event".to_string(),
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// 为事件生成的日志行
    pub fn line(&self, event: &Event) -> String {
        format!("[{}] {} {}", self.prefix, event.event_type(), event.payload())
    }
}

impl<H: EventHandler> EventHandler for Logged<H> {
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let line = self.line(event);
        let handler = self.inner.handler_name();
        if self.level == Level::ERROR {
            error!(handler, "{line}");
        } else if self.level == Level::WARN {
            warn!(handler, "{line}");
        } else if self.level == Level::INFO {
            info!(handler, "{line}");
        } else if self.level == Level::DEBUG {
            debug!(handler, "{line}");
        } else {
            trace!(handler, "{line}");
        }
        self.inner.handle(event)
    }

    fn handler_name(&self) -> &str {
        self.inner.handler_name()
    }
}
