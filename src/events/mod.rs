//! 状态变化事件模块
//!
//! 定义站点状态变化事件和至少一次投递的发布接口

pub mod publisher;

use crate::site::Site;
use serde::{Deserialize, Serialize};

pub use publisher::{BroadcastPublisher, EventPublisher, FanoutPublisher, WebhookPublisher};

/// 站点状态变化事件
///
/// `up` 为变化后的新状态。事件没有去重键，订阅端需要能处理重复投递。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// 发生变化的站点
    pub site: Site,
    /// 站点当前是否可达
    pub up: bool,
}

impl TransitionEvent {
    /// 创建状态变化事件
    pub fn new(site: Site, up: bool) -> Self {
        Self { site, up }
    }
}
