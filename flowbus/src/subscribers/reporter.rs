//! 日志上报订阅者（ReportingSubscriber）
//!
//! 将事件负载展开为一条扁平记录，附加元信息后以 INFO 级别写入 `tracing`：
//! - 对象负载：字段原样保留；
//! - 其他负载：放入 `value` 字段；
//! - 元信息：`event_type`、`event_id`、`event_source`（订阅者侧）、`publisher`（事件侧）。
//!
use crate::event::Event;
use crate::eventing::EventHandler;
use serde_json::{Map, Value, json};
use tracing::info;

#[derive(Debug, Default, Clone)]
pub struct ReportingSubscriber {
    event_source: Option<String>,
}

impl ReportingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(event_source: impl Into<String>) -> Self {
        Self {
            event_source: Some(event_source.into()),
        }
    }

    pub fn event_source(&self) -> Option<&str> {
        self.event_source.as_deref()
    }

    /// 生成该事件的结构化记录
    pub fn report(&self, event: &Event) -> Value {
        let mut record = match event.payload() {
            Value::Object(fields) => fields.clone(),
            other => {
                let mut m = Map::new();
                m.insert("value".into(), other.clone());
                m
            }
        };

        record.insert("event_type".into(), json!(event.event_type()));
        record.insert("event_id".into(), json!(event.event_id()));
        record.insert("event_source".into(), json!(self.event_source));
        record.insert("publisher".into(), json!(event.source()));
        Value::Object(record)
    }
}

impl EventHandler for ReportingSubscriber {
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let record = self.report(event);
        info!(
            event_type = %event.event_type(),
            event_source = self.event_source.as_deref().unwrap_or("-"),
            event_data = %record,
            "event received"
        );
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "reporter"
    }
}
