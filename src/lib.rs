//! Site Vitals - 站点可用性监控工具
//!
//! 定期探测已注册站点是否可达，保存按时间排序的检测历史，
//! 并且只在站点状态在可达与不可达之间切换时发出事件：
//! - 受并发上限约束的全站巡检，单站点失败互不影响
//! - 先发布事件再写入记录，保证状态变化至少投递一次
//! - 飞书通知、状态变化webhook和Prometheus指标
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod notification;
pub mod site;
pub mod web;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, SiteConfig};
pub use error::{CheckError, SiteVitalsError, SweepError};
pub use events::{EventPublisher, TransitionEvent};
pub use health::{CheckHistory, CheckRecord, Monitor, Prober, SweepReport, Sweeper};
pub use site::{Site, SiteId, SiteRegistry};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
