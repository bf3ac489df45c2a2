//! 订阅组（SubscriptionGroup）
//!
//! 把同一订阅方的多条订阅作为整体管理：
//! - 以（事件类型, handler 名称）标识一条订阅，重复加入为幂等操作；
//! - 组内 handler 由总线保活，直到组退订；
//! - `clear` 整体退订，组被丢弃时同样整体退订。
//!
use crate::error::BusResult;
use crate::event::{Event, EventType};
use crate::eventing::{EventBus, EventHandler, FnHandler, SubscriptionHandle};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

struct Member {
    name: String,
    handle: SubscriptionHandle,
}

pub struct SubscriptionGroup<'a> {
    bus: &'a EventBus,
    members: Vec<Member>,
}

impl<'a> SubscriptionGroup<'a> {
    pub fn new(bus: &'a EventBus) -> Self {
        Self {
            bus,
            members: Vec::new(),
        }
    }

    /// 加入一条订阅；组内已有同类型同名订阅时返回原句柄
    pub fn subscribe<H: EventHandler>(
        &mut self,
        event_type: impl Into<EventType>,
        handler: Arc<H>,
    ) -> BusResult<SubscriptionHandle> {
        let name = handler.handler_name().to_string();
        self.add(event_type.into(), name, handler)
    }

    pub fn subscribe_fn<F>(
        &mut self,
        event_type: impl Into<EventType>,
        name: impl Into<String>,
        f: F,
    ) -> BusResult<SubscriptionHandle>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let handler = Arc::new(FnHandler::new(name.clone(), f));
        self.add(event_type.into(), name, handler)
    }

    fn add(
        &mut self,
        event_type: EventType,
        name: String,
        handler: Arc<dyn EventHandler>,
    ) -> BusResult<SubscriptionHandle> {
        if let Some(member) = self.find(&event_type, &name) {
            return Ok(member.handle.clone());
        }

        let handle = self.bus.subscribe_retained(event_type, handler)?;
        self.members.push(Member {
            name,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    fn find(&self, event_type: &EventType, name: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.handle.event_type() == event_type && m.name == name)
    }

    pub fn contains(&self, event_type: impl Into<EventType>, name: &str) -> bool {
        self.find(&event_type.into(), name).is_some()
    }

    pub fn handles(&self) -> Vec<SubscriptionHandle> {
        self.members.iter().map(|m| m.handle.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 退订组内一条订阅；不存在时返回 `Ok(false)`
    pub fn remove(&mut self, event_type: impl Into<EventType>, name: &str) -> BusResult<bool> {
        let event_type = event_type.into();
        let Some(idx) = self
            .members
            .iter()
            .position(|m| m.handle.event_type() == &event_type && m.name == name)
        else {
            return Ok(false);
        };
        let member = self.members.remove(idx);
        self.bus.unsubscribe(&member.handle)
    }

    /// 整体退订，返回实际退订的数量；总线已关闭时订阅已随之释放，记为 0
    pub fn clear(&mut self) -> usize {
        let members = std::mem::take(&mut self.members);
        let removed = members
            .iter()
            .filter(|m| matches!(self.bus.unsubscribe(&m.handle), Ok(true)))
            .count();
        debug!(total = members.len(), removed, "subscription group cleared");
        removed
    }
}

impl Drop for SubscriptionGroup<'_> {
    fn drop(&mut self) {
        if !self.members.is_empty() {
            self.clear();
        }
    }
}

impl fmt::Debug for SubscriptionGroup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGroup")
            .field("subscriptions", &self.members.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Calls {
        seen: Mutex<Vec<String>>,
    }

    impl EventHandler for Calls {
        fn handle(&self, event: &Event) -> anyhow::Result<()> {
            self.seen.lock().push(event.event_type().to_string());
            Ok(())
        }

        fn handler_name(&self) -> &str {
            "calls"
        }
    }

    #[test]
    fn group_subscriptions_fire_and_dedupe() {
        let bus = EventBus::default();
        let calls = Arc::new(Calls::default());
        let mut group = SubscriptionGroup::new(&bus);

        let first = group.subscribe("event.1", calls.clone()).unwrap();
        let again = group.subscribe("event.1", calls.clone()).unwrap();
        assert_eq!(first, again);
        group.subscribe("event.2", calls.clone()).unwrap();
        assert_eq!(group.len(), 2);

        bus.publish(Event::new("event.1", json!("test"))).unwrap();
        bus.publish(Event::new("event.2", json!("test"))).unwrap();
        assert_eq!(*calls.seen.lock(), ["event.1", "event.2"]);
    }

    #[test]
    fn group_keeps_handlers_alive() {
        let bus = EventBus::default();
        let mut group = SubscriptionGroup::new(&bus);
        group.subscribe("x", Arc::new(Calls::default())).unwrap();
        let fired = bus.publish(Event::new("x", json!(null))).unwrap();
        assert_eq!(fired.invoked, 1);
    }

    #[test]
    fn closures_are_deduplicated_by_name() {
        let bus = EventBus::default();
        let mut group = SubscriptionGroup::new(&bus);
        let a = group.subscribe_fn("x", "audit", |_| Ok(())).unwrap();
        let b = group.subscribe_fn("x", "audit", |_| Ok(())).unwrap();
        assert_eq!(a, b);
        assert_eq!(bus.registry().len(), 1);
        assert!(group.contains("x", "audit"));
    }

    #[test]
    fn remove_and_clear_unsubscribe() {
        let bus = EventBus::default();
        let calls = Arc::new(Calls::default());
        let mut group = SubscriptionGroup::new(&bus);
        group.subscribe("a", calls.clone()).unwrap();
        group.subscribe("b", calls.clone()).unwrap();
        group.subscribe("c", calls.clone()).unwrap();

        assert!(group.remove("a", "calls").unwrap());
        assert!(!group.remove("a", "calls").unwrap());
        assert_eq!(bus.registry().len(), 2);

        assert_eq!(group.clear(), 2);
        assert!(group.is_empty());
        assert!(bus.registry().is_empty());

        bus.publish(Event::new("b", json!(null))).unwrap();
        assert!(calls.seen.lock().is_empty());
    }

    #[test]
    fn dropping_the_group_unsubscribes_everything() {
        let bus = EventBus::default();
        let calls = Arc::new(Calls::default());
        {
            let mut group = SubscriptionGroup::new(&bus);
            group.subscribe("a", calls.clone()).unwrap();
            group.subscribe_fn("a", "noop", |_| Ok(())).unwrap();
            assert_eq!(bus.registry().len(), 2);
        }
        assert!(bus.registry().is_empty());
        assert_eq!(Arc::strong_count(&calls), 1);
    }

    #[test]
    fn closed_bus_is_reported_and_clear_is_quiet() {
        let bus = EventBus::default();
        let mut group = SubscriptionGroup::new(&bus);
        group.subscribe_fn("a", "noop", |_| Ok(())).unwrap();
        bus.close();

        assert!(matches!(
            group.subscribe_fn("b", "noop", |_| Ok(())),
            Err(BusError::BusClosed)
        ));
        assert_eq!(group.clear(), 0);
    }
}
