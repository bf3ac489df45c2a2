use flowbus::{Event, EventBus, EventHandler};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

struct Worker {
    hits: AtomicUsize,
}

impl EventHandler for Worker {
    fn handle(&self, _event: &Event) -> anyhow::Result<()> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

const ACTORS: usize = 8;
const ROUNDS: usize = 500;

#[test]
fn concurrent_subscribe_unsubscribe_publish_is_race_free() {
    let bus = EventBus::default();
    let stable = Arc::new(Worker {
        hits: AtomicUsize::new(0),
    });
    bus.subscribe("stress", &stable).unwrap();

    thread::scope(|s| {
        // 订阅/退订者
        for _ in 0..ACTORS {
            s.spawn(|| {
                let mine = Arc::new(Worker {
                    hits: AtomicUsize::new(0),
                });
                for _ in 0..ROUNDS {
                    let handle = bus.subscribe("stress", &mine).unwrap();
                    // 重复订阅必须返回同一句柄
                    assert_eq!(bus.subscribe("stress", &mine).unwrap(), handle);
                    assert!(bus.unsubscribe(&handle).unwrap());
                    assert!(!bus.unsubscribe(&handle).unwrap());
                }
            });
        }

        // 发布者
        for _ in 0..ACTORS {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    let result = bus.publish(Event::new("stress", json!(null))).unwrap();
                    assert!(result.invoked >= 1);
                    assert!(result.is_success());
                }
            });
        }

        // 快照检查者：不得出现重复条目
        for _ in 0..ACTORS / 2 {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    let snapshot = bus.handlers_for("stress").unwrap();
                    let ids: HashSet<u64> = snapshot.iter().map(|s| s.id()).collect();
                    assert_eq!(ids.len(), snapshot.len());
                    assert!(snapshot.iter().any(|s| s.is(&stable)));
                }
            });
        }
    });

    assert_eq!(stable.hits.load(Ordering::Relaxed), ACTORS * ROUNDS);
    let remaining = bus.handlers_for("stress").unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].is(&stable));
}

#[test]
fn concurrent_close_leaves_a_consistent_terminal_state() {
    let bus = EventBus::default();
    let worker = Arc::new(Worker {
        hits: AtomicUsize::new(0),
    });

    let closers = AtomicUsize::new(0);
    thread::scope(|s| {
        for i in 0..ACTORS {
            let bus = &bus;
            let worker = &worker;
            let closers = &closers;
            s.spawn(move || {
                for round in 0..ROUNDS {
                    if i == 0 && round == ROUNDS / 2 && bus.close() {
                        closers.fetch_add(1, Ordering::SeqCst);
                    }
                    // 关闭前后都只能是成功或 BusClosed
                    match bus.subscribe(format!("t{}", round % 4), worker) {
                        Ok(_) | Err(flowbus::BusError::BusClosed) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                    match bus.publish(Event::new(format!("t{}", round % 4), json!(round))) {
                        Ok(_) | Err(flowbus::BusError::BusClosed) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            });
        }
    });

    assert_eq!(closers.load(Ordering::SeqCst), 1);
    assert!(bus.is_closed());
    assert!(bus.registry().is_empty());
}

/// Drop 时读取同一总线的 handler
struct Reentrant {
    bus: Arc<EventBus>,
}

impl EventHandler for Reentrant {
    fn handle(&self, _event: &Event) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Drop for Reentrant {
    fn drop(&mut self) {
        let _ = self.bus.registry().len();
    }
}

#[test]
fn handler_drop_racing_duplicate_checks_does_not_deadlock() {
    let bus = Arc::new(EventBus::default());
    let (done_tx, done_rx) = mpsc::channel();

    // 死锁时工作线程无法结束，由超时判定失败
    {
        let bus = bus.clone();
        thread::spawn(move || {
            thread::scope(|s| {
                for _ in 0..ACTORS / 2 {
                    s.spawn(|| {
                        for _ in 0..ROUNDS * 4 {
                            let handle = bus.subscribe_fn("x", "churn", |_| Ok(())).unwrap();
                            bus.unsubscribe(&handle).unwrap();
                        }
                    });
                }
                for _ in 0..ACTORS / 2 {
                    s.spawn(|| {
                        for _ in 0..ROUNDS * 4 {
                            let owner = Arc::new(Reentrant { bus: bus.clone() });
                            bus.subscribe("x", &owner).unwrap();
                            drop(owner);
                        }
                    });
                }
            });
            let _ = done_tx.send(());
        });
    }

    assert!(
        done_rx.recv_timeout(Duration::from_secs(30)).is_ok(),
        "registry deadlocked while a handler was dropped"
    );
    assert_eq!(bus.registry().len(), 0);
}
