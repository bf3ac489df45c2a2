//! 事件模型（EventType / Event）
//!
//! - `EventType`：事件分类键，进程生命周期内稳定可比较、可哈希；
//! - `Event`：发布时构造的不可变值，携带类型、JSON 负载与元信息。
//!
use crate::error::BusResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{borrow::Borrow, fmt, sync::Arc};
use uuid::Uuid;

/// 事件类型键，克隆开销为一次引用计数
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Arc<str>);

impl EventType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventType").field(&self.as_str()).finish()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EventType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EventType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&EventType> for EventType {
    fn from(value: &EventType) -> Self {
        value.clone()
    }
}

/// 已发布的事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 事件唯一标识符
    event_id: Uuid,
    /// 事件类型，决定分发到哪些 handler
    event_type: EventType,
    /// 事件负载
    payload: Value,
    /// 事件构造时间
    occurred_at: DateTime<Utc>,
    /// 发布方标识（可选，用于审计与日志）
    source: Option<String>,
}

impl Event {
    pub fn new(event_type: impl Into<EventType>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            occurred_at: Utc::now(),
            source: None,
        }
    }

    /// 将任意可序列化数据作为负载构造事件
    pub fn from_data<T: Serialize>(event_type: impl Into<EventType>, data: &T) -> BusResult<Self> {
        Ok(Self::new(event_type, serde_json::to_value(data)?))
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// 将负载反序列化为具体类型
    pub fn data<T: DeserializeOwned>(&self) -> BusResult<T> {
        Ok(T::deserialize(&self.payload)?)
    }
}
