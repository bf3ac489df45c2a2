/// 进程内事件总线示例
/// 展示订阅 -> 同步发布 -> 异步发布 -> 失败隔离 -> 关闭 的完整流程
use anyhow::Result as AnyResult;
use flowbus::subscribers::{Logged, ReportingSubscriber, TrackingSubscriber};
use flowbus::{
    Event, EventBus, EventBusConfig, EventHandler, Publication, Publisher, SubscriptionGroup,
    handler_fn,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ============================================================================
// 事件负载
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct OrderCreated {
    id: u64,
    amount: u64,
}

// ============================================================================
// 处理器：累计订单金额
// ============================================================================

#[derive(Default)]
struct Revenue {
    total: AtomicU64,
}

impl EventHandler for Revenue {
    fn handle(&self, event: &Event) -> AnyResult<()> {
        let order: OrderCreated = event.data()?;
        self.total.fetch_add(order.amount, Ordering::Relaxed);
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "revenue"
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bus = EventBus::builder()
        .config(EventBusConfig {
            handler_concurrency: 4,
            dispatch_timeout: Some(Duration::from_secs(1)),
        })
        .build();

    let revenue = Arc::new(Revenue::default());
    let tracker = Arc::new(TrackingSubscriber::with_max_len(16));
    let reporter = Arc::new(ReportingSubscriber::with_source("example"));

    bus.subscribe("order.created", &revenue)?;
    bus.subscribe_many(["order.created", "order.cancelled"], &tracker)?;
    bus.subscribe("order.created", &reporter)?;
    let flaky = bus.subscribe_fn("order.created", "flaky", |ev| {
        let order: OrderCreated = ev.data()?;
        if order.id % 2 == 0 {
            anyhow::bail!("refusing even order {}", order.id);
        }
        Ok(())
    })?;

    // 同步发布：当前线程按订阅顺序执行
    let result = bus.publish(Event::from_data(
        "order.created",
        &OrderCreated { id: 1, amount: 30 },
    )?)?;
    println!(
        "sync: invoked={} failures={}",
        result.invoked,
        result.failures.len()
    );

    // 异步发布：等待聚合结果
    let token = bus.publish_async(
        Event::from_data("order.created", &OrderCreated { id: 2, amount: 12 })?
            .with_source("checkout"),
    )?;
    let result = token.join().await?;
    for failure in &result.failures {
        println!("async: handler {} failed: {}", failure.handler, failure.error);
    }

    // 退订后不再调用
    bus.unsubscribe(&flaky)?;

    // fire-and-forget：失败交给默认的 tracing 出口
    bus.publish_async(Event::from_data(
        "order.created",
        &OrderCreated { id: 4, amount: 8 },
    )?)?
    .detach();

    // 声明式发布 + 订阅组：组离开作用域即整体退订
    let created: Publication<OrderCreated> = Publication::new("order.created");
    let publisher = Publisher::new(&bus).declare(&created);
    {
        let mut group = SubscriptionGroup::new(&bus);
        group.subscribe(
            "order.created",
            Arc::new(Logged::new(handler_fn("audit", |_| Ok(()))).prefix("Audit")),
        )?;
        publisher.trigger(&created, &OrderCreated { id: 5, amount: 20 })?;
    }
    if let Err(err) = publisher.publish(Event::new("order.shipped", serde_json::json!({}))) {
        println!("rejected: {err}");
    }

    bus.drain().await;
    println!(
        "revenue total={} tracked={}",
        revenue.total.load(Ordering::Relaxed),
        tracker.len()
    );

    bus.close();
    Ok(())
}
