//! 订阅注册表（Registry）
//!
//! 维护 `EventType -> [handler]` 的有序映射：
//! - 同一类型下按订阅顺序保存，分发顺序即订阅顺序；
//! - 同一 handler（按 `Arc` 身份）重复订阅同一类型为幂等操作，返回原有句柄；
//! - 默认仅持有 handler 的弱引用，不延长订阅方生命周期；订阅方被释放后，
//!   该订阅在快照中被跳过，并在下一次变更该类型时被清理；
//! - 所有读写经由同一把读写锁，`handlers_for` 返回的是加锁时刻的快照。
//!
//! 关闭（`close`）后注册表进入终态，任何订阅/退订/查询都返回 `BusClosed`。
//!
use crate::error::{BusError, BusResult};
use crate::event::EventType;
use crate::eventing::EventHandler;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// 订阅句柄，可用于精确退订本次注册
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    registry: u64,
    id: u64,
    event_type: EventType,
}

impl SubscriptionHandle {
    /// 注册表内的订阅序号
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }
}

/// 快照中的一条订阅：持有 handler 的强引用直到本次分发结束
#[derive(Clone)]
pub struct Subscriber {
    id: u64,
    handler: Arc<dyn EventHandler>,
}

impl Subscriber {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        self.handler.handler_name()
    }

    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    pub fn is(&self, handler: &Arc<impl EventHandler>) -> bool {
        same_handler(&self.handler, handler)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

struct Entry {
    id: u64,
    handler: Weak<dyn EventHandler>,
    // 无外部所有者的 handler（如闭包）由注册表保活
    retained: Option<Arc<dyn EventHandler>>,
}

impl Entry {
    fn is_alive(&self) -> bool {
        self.handler.strong_count() > 0
    }

    // 只比较地址，不升级弱引用：升级出的临时 Arc 可能成为最后一个强引用，
    // 使 handler 的 Drop 在持锁期间运行
    fn holds(&self, handler: &Arc<dyn EventHandler>) -> bool {
        self.is_alive() && std::ptr::addr_eq(self.handler.as_ptr(), Arc::as_ptr(handler))
    }

    fn subscriber(&self) -> Option<Subscriber> {
        self.handler.upgrade().map(|handler| Subscriber {
            id: self.id,
            handler,
        })
    }
}

#[derive(Default)]
struct State {
    closed: bool,
    next_id: u64,
    by_type: HashMap<EventType, Vec<Entry>>,
}

/// 有序、线程安全的订阅注册表
pub struct Registry {
    id: u64,
    state: RwLock<State>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            state: RwLock::new(State::default()),
        }
    }

    /// 以弱引用订阅：注册表不延长 handler 的生命周期
    ///
    /// 调用方须自行持有 `handler`，最后一个 `Arc` 释放后该订阅不再触发。
    /// 传入临时值（如 `&Arc::new(h)`）得到的订阅永远不会被调用；
    /// 这种情况应使用 [`Registry::subscribe_retained`]。
    pub fn subscribe<H: EventHandler>(
        &self,
        event_type: impl Into<EventType>,
        handler: &Arc<H>,
    ) -> BusResult<SubscriptionHandle> {
        let event_type = event_type.into();
        if Arc::strong_count(handler) == 1 {
            debug!(
                event_type = %event_type,
                handler = %handler.handler_name(),
                "weakly held handler has a single owner"
            );
        }
        let handler: Arc<dyn EventHandler> = handler.clone();
        self.insert(event_type, handler, false)
    }

    /// 以强引用订阅：handler 由注册表保活，直到退订或关闭
    pub fn subscribe_retained(
        &self,
        event_type: impl Into<EventType>,
        handler: Arc<dyn EventHandler>,
    ) -> BusResult<SubscriptionHandle> {
        self.insert(event_type.into(), handler, true)
    }

    /// 将同一 handler 订阅到多个类型；任一类型非法时不注册任何订阅
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
        let types: Vec<EventType> = event_types.into_iter().map(Into::into).collect();
        if let Some(bad) = types.iter().find(|t| t.is_empty()) {
            return Err(BusError::invalid_subscription(format!(
                "empty event type {bad:?}"
            )));
        }

        types
            .into_iter()
            .map(|t| self.subscribe(t, handler))
            .collect()
    }

    fn insert(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        retain: bool,
    ) -> BusResult<SubscriptionHandle> {
        if event_type.is_empty() {
            return Err(BusError::invalid_subscription("empty event type"));
        }

        let mut state = self.state.write();
        if state.closed {
            return Err(BusError::BusClosed);
        }

        let entries = state.by_type.entry(event_type.clone()).or_default();
        entries.retain(Entry::is_alive);

        if let Some(existing) = entries.iter_mut().find(|e| e.holds(&handler)) {
            if retain && existing.retained.is_none() {
                existing.retained = Some(handler);
            }
            return Ok(self.handle(existing.id, event_type));
        }

        state.next_id += 1;
        let id = state.next_id;
        let name = handler.handler_name().to_string();
        state
            .by_type
            .entry(event_type.clone())
            .or_default()
            .push(Entry {
                id,
                handler: Arc::downgrade(&handler),
                retained: retain.then_some(handler),
            });
        drop(state);

        debug!(event_type = %event_type, subscription = id, handler = %name, "subscribed");
        Ok(self.handle(id, event_type))
    }

    /// 退订；句柄未知或已退订时返回 `Ok(false)`
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> BusResult<bool> {
        let mut state = self.state.write();
        if state.closed {
            return Err(BusError::BusClosed);
        }
        if handle.registry != self.id {
            return Ok(false);
        }

        let Some(entries) = state.by_type.get_mut(handle.event_type.as_str()) else {
            return Ok(false);
        };
        let removed = entries
            .iter()
            .position(|e| e.id == handle.id)
            .map(|idx| entries.remove(idx));
        entries.retain(Entry::is_alive);
        if entries.is_empty() {
            state.by_type.remove(handle.event_type.as_str());
        }
        drop(state);

        // 保活的 handler 在锁外释放
        let found = removed.is_some();
        drop(removed);

        if found {
            debug!(event_type = %handle.event_type, subscription = handle.id, "unsubscribed");
        }
        Ok(found)
    }

    /// 返回某类型当前 handler 的有序快照；无订阅时返回空列表
    pub fn handlers_for(&self, event_type: impl AsRef<str>) -> BusResult<Vec<Subscriber>> {
        let state = self.state.read();
        if state.closed {
            return Err(BusError::BusClosed);
        }

        Ok(state
            .by_type
            .get(event_type.as_ref())
            .map(|entries| entries.iter().filter_map(Entry::subscriber).collect())
            .unwrap_or_default())
    }

    /// 清理所有已失效的弱引用订阅，返回清理数量
    pub fn prune(&self) -> usize {
        let mut state = self.state.write();
        let mut removed = 0;
        state.by_type.retain(|_, entries| {
            let before = entries.len();
            entries.retain(Entry::is_alive);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    /// 存活订阅数量
    pub fn len(&self) -> usize {
        self.state
            .read()
            .by_type
            .values()
            .map(|entries| entries.iter().filter(|e| e.is_alive()).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 至少存在一个存活订阅的类型
    pub fn event_types(&self) -> Vec<EventType> {
        let state = self.state.read();
        let mut types: Vec<EventType> = state
            .by_type
            .iter()
            .filter(|(_, entries)| entries.iter().any(Entry::is_alive))
            .map(|(t, _)| t.clone())
            .collect();
        types.sort();
        types
    }

    /// 进入终态并清空所有订阅；重复关闭返回 `false`
    pub fn close(&self) -> bool {
        let mut state = self.state.write();
        if state.closed {
            return false;
        }
        state.closed = true;
        let dropped = std::mem::take(&mut state.by_type);
        drop(state);

        let count: usize = dropped.values().map(Vec::len).sum();
        drop(dropped);
        debug!(registry = self.id, released = count, "registry closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    fn handle(&self, id: u64, event_type: EventType) -> SubscriptionHandle {
        SubscriptionHandle {
            registry: self.id,
            id,
            event_type,
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("subscriptions", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn same_handler<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
