//! 事件追踪订阅者（TrackingSubscriber）
//!
//! - 以有界队列保留最近收到的事件，超出 `max_len` 时淘汰最旧的；
//! - `wait_for` 等待调用之后到达的第一个指定类型事件，多个等待者收到同一事件；
//! - 等待超时或被丢弃后不残留任何等待状态。
//!
use crate::event::{Event, EventType};
use crate::eventing::EventHandler;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const DEFAULT_MAX_LEN: usize = 50;

pub struct TrackingSubscriber {
    event_source: Option<String>,
    max_len: usize,
    log: Mutex<VecDeque<Event>>,
    arrivals: broadcast::Sender<Event>,
}

impl Default for TrackingSubscriber {
    fn default() -> Self {
        Self::with_max_len(DEFAULT_MAX_LEN)
    }
}

impl TrackingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max_len` 至少为 1
    pub fn with_max_len(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        let (arrivals, _rx) = broadcast::channel(max_len.max(16));
        Self {
            event_source: None,
            max_len,
            log: Mutex::new(VecDeque::with_capacity(max_len)),
            arrivals,
        }
    }

    pub fn source(mut self, event_source: impl Into<String>) -> Self {
        self.event_source = Some(event_source.into());
        self
    }

    pub fn event_source(&self) -> Option<&str> {
        self.event_source.as_deref()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// 按到达顺序返回当前保留的事件
    pub fn events(&self) -> Vec<Event> {
        self.log.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    /// 等待下一个 `event_type` 类型的事件；超时返回 `None`
    pub async fn wait_for(
        &self,
        event_type: impl Into<EventType>,
        timeout: Duration,
    ) -> Option<Event> {
        let event_type = event_type.into();
        let mut rx = self.arrivals.subscribe();

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(ev) if ev.event_type() == &event_type => return Some(ev),
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    /// 当前挂起的 `wait_for` 数量
    pub fn waiting(&self) -> usize {
        self.arrivals.receiver_count()
    }
}

impl EventHandler for TrackingSubscriber {
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        {
            let mut log = self.log.lock();
            if log.len() == self.max_len {
                log.pop_front();
            }
            log.push_back(event.clone());
        }
        // 无等待者时发送失败，忽略即可
        let _ = self.arrivals.send(event.clone());
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "tracker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn ev(ty: &str, i: u64) -> Event {
        Event::new(ty, json!({"message": format!("message {i}"), "value": i}))
    }

    #[test]
    fn construction() {
        let t = TrackingSubscriber::new().source("test_source");
        assert_eq!(t.event_source(), Some("test_source"));
        assert_eq!(t.max_len(), DEFAULT_MAX_LEN);
        assert_eq!(TrackingSubscriber::with_max_len(10).max_len(), 10);
        assert_eq!(TrackingSubscriber::with_max_len(0).max_len(), 1);
        assert!(TrackingSubscriber::new().event_source().is_none());
    }

    #[test]
    fn log_is_bounded() {
        let t = TrackingSubscriber::with_max_len(2);
        let events: Vec<Event> = (0..3).map(|i| ev("m", i)).collect();
        for e in &events {
            t.handle(e).unwrap();
        }

        let kept: Vec<_> = t.events().iter().map(Event::event_id).collect();
        let expected: Vec<_> = events[1..].iter().map(Event::event_id).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn clear_empties_log() {
        let t = TrackingSubscriber::new();
        for i in 0..3 {
            t.handle(&ev("m", i)).unwrap();
        }
        assert_eq!(t.len(), 3);
        t.clear();
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn wait_for_receives_event() {
        let t = Arc::new(TrackingSubscriber::new());
        let waiter = {
            let t = t.clone();
            tokio::spawn(async move { t.wait_for("m", Duration::from_secs(1)).await })
        };
        while t.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        let sent = ev("m", 42);
        t.handle(&sent).unwrap();
        let got = waiter.await.unwrap().expect("event should arrive");
        assert_eq!(got.event_id(), sent.event_id());
    }

    #[tokio::test]
    async fn wait_for_times_out_and_cleans_up() {
        let t = TrackingSubscriber::new();
        assert!(t.wait_for("m", Duration::from_millis(20)).await.is_none());
        assert_eq!(t.waiting(), 0);
    }

    #[tokio::test]
    async fn wait_for_ignores_other_types() {
        let t = Arc::new(TrackingSubscriber::new());
        let waiter = {
            let t = t.clone();
            tokio::spawn(async move { t.wait_for("m", Duration::from_millis(200)).await })
        };
        while t.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        t.handle(&ev("other", 1)).unwrap();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn multiple_waiters_get_the_same_event() {
        let t = Arc::new(TrackingSubscriber::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let t = t.clone();
                tokio::spawn(async move { t.wait_for("m", Duration::from_secs(1)).await })
            })
            .collect();
        while t.waiting() < 3 {
            tokio::task::yield_now().await;
        }

        let sent = ev("m", 7);
        t.handle(&sent).unwrap();
        for w in waiters {
            assert_eq!(w.await.unwrap().unwrap().event_id(), sent.event_id());
        }
    }
}
