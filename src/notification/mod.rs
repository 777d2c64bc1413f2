//! 通知模块
//!
//! 提供飞书通知、消息模板以及状态变化事件订阅功能

pub mod feishu;
pub mod sender;
pub mod subscriber;
pub mod template;

// 重新导出主要类型
pub use feishu::FeishuSender;
pub use sender::{MessageType, NotificationMessage, NotificationSender};
pub use subscriber::TransitionNotifier;
pub use template::{default_transition_template, HandlebarsTemplate, MessageTemplate};
