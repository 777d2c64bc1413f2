//! 健康检测模块
//!
//! 提供站点探测、检测历史、状态变化判定、全站巡检和任务调度功能

pub mod history;
pub mod monitor;
pub mod prober;
pub mod scheduler;
pub mod sweeper;
pub mod transition;

// 重新导出主要类型
pub use history::{CheckHistory, CheckRecord, JsonlCheckHistory, MemoryCheckHistory};
pub use monitor::{CheckOutcome, Monitor};
pub use prober::{HttpProber, PingResult, Prober};
pub use scheduler::{MonitorScheduler, Scheduler, SchedulerStatus};
pub use sweeper::{SweepReport, Sweeper};
pub use transition::Transition;
