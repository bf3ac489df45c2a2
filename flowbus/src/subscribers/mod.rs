//! 常用订阅者
//!
//! - `ReportingSubscriber`：把收到的事件整理为结构化记录并写入日志；
//! - `TrackingSubscriber`：保留最近的事件并支持等待某类事件到达（常用于测试）；
//! - `Logged`：为任意 handler 加上逐事件日志。
//!
pub mod logged;
pub mod reporter;
pub mod tracker;

pub use logged::Logged;
pub use reporter::ReportingSubscriber;
pub use tracker::TrackingSubscriber;
