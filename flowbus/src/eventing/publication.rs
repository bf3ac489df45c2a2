//! 发布契约（Publication / Publisher）
//!
//! - `Publication<T>`：把事件类型与负载类型 `T` 绑定，负载必须能解析为 `T`；
//! - `Publisher`：在某条总线上声明自己发布哪些 `Publication`，
//!   未声明的类型既不能发布也不能订阅，负载不符的事件在分发前被拒绝。
//!
use crate::error::{BusError, BusResult};
use crate::event::{Event, EventType};
use crate::eventing::{
    CompletionToken, DispatchResult, EventBus, EventHandler, SubscriptionHandle,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// 类型化的事件发布点
pub struct Publication<T> {
    event_type: EventType,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Publication<T> {
    pub fn new(event_type: impl Into<EventType>) -> Self {
        Self {
            event_type: event_type.into(),
            _marker: PhantomData,
        }
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }
}

impl<T: Serialize> Publication<T> {
    /// 以 `data` 为负载构造本发布点的事件
    pub fn event(&self, data: &T) -> BusResult<Event> {
        Event::from_data(self.event_type.clone(), data)
    }
}

impl<T: DeserializeOwned> Publication<T> {
    /// 校验事件属于本发布点且负载可解析为 `T`
    pub fn check(&self, event: &Event) -> BusResult<()> {
        if event.event_type() != &self.event_type {
            return Err(BusError::type_mismatch(
                self.event_type.as_str(),
                event.event_type().as_str(),
            ));
        }
        check_payload::<T>(event.event_type(), event.payload())
    }

    /// 校验后取出类型化负载
    pub fn decode(&self, event: &Event) -> BusResult<T> {
        self.check(event)?;
        event.data()
    }
}

impl<T> Clone for Publication<T> {
    fn clone(&self) -> Self {
        Self::new(self.event_type.clone())
    }
}

impl<T> fmt::Debug for Publication<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("event_type", &self.event_type)
            .field("payload", &std::any::type_name::<T>())
            .finish()
    }
}

type PayloadCheck = fn(&EventType, &Value) -> BusResult<()>;

fn check_payload<T: DeserializeOwned>(event_type: &EventType, payload: &Value) -> BusResult<()> {
    T::deserialize(payload)
        .map(drop)
        .map_err(|err| BusError::InvalidPayload {
            event_type: event_type.to_string(),
            reason: err.to_string(),
        })
}

/// 只发布已声明事件的发布方
pub struct Publisher<'a> {
    bus: &'a EventBus,
    declared: HashMap<EventType, PayloadCheck>,
}

impl<'a> Publisher<'a> {
    pub fn new(bus: &'a EventBus) -> Self {
        Self {
            bus,
            declared: HashMap::new(),
        }
    }

    /// 声明一个发布点；同一事件类型重复声明时以最后一次的负载类型为准
    pub fn declare<T: DeserializeOwned>(mut self, publication: &Publication<T>) -> Self {
        self.declared
            .insert(publication.event_type.clone(), check_payload::<T>);
        self
    }

    pub fn declares(&self, event_type: impl AsRef<str>) -> bool {
        self.declared.contains_key(event_type.as_ref())
    }

    /// 已声明的事件类型（有序）
    pub fn publications(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = self.declared.keys().cloned().collect();
        types.sort();
        types
    }

    /// 订阅本发布方的某个发布点，语义同 [`EventBus::subscribe`]
    pub fn subscribe<T, H: EventHandler>(
        &self,
        publication: &Publication<T>,
        handler: &Arc<H>,
    ) -> BusResult<SubscriptionHandle> {
        self.ensure_declared(publication.event_type())?;
        self.bus.subscribe(publication.event_type().clone(), handler)
    }

    /// 同步发布类型化负载
    pub fn trigger<T: Serialize>(
        &self,
        publication: &Publication<T>,
        data: &T,
    ) -> BusResult<DispatchResult> {
        self.publish(publication.event(data)?)
    }

    /// 校验后同步发布
    pub fn publish(&self, event: Event) -> BusResult<DispatchResult> {
        self.validate(&event)?;
        self.bus.publish(event)
    }

    /// 校验后异步发布
    pub fn publish_async(&self, event: Event) -> BusResult<CompletionToken> {
        self.validate(&event)?;
        self.bus.publish_async(event)
    }

    fn ensure_declared(&self, event_type: &EventType) -> BusResult<PayloadCheck> {
        self.declared
            .get(event_type.as_str())
            .copied()
            .ok_or_else(|| BusError::UndeclaredPublication {
                event_type: event_type.to_string(),
            })
    }

    fn validate(&self, event: &Event) -> BusResult<()> {
        let check = self.ensure_declared(event.event_type())?;
        check(event.event_type(), event.payload()).inspect_err(|err| {
            debug!(event_type = %event.event_type(), error = %err, "publication rejected");
        })
    }
}

impl fmt::Debug for Publisher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("publications", &self.publications())
            .finish()
    }
}
