//! 通知发送器模块
//!
//! 定义通知发送的trait和基础实现

use crate::events::TransitionEvent;
use anyhow::Result;
use async_trait::async_trait;

/// 通知消息结构
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    /// 消息标题
    pub title: String,
    /// 消息内容
    pub content: String,
    /// 消息类型
    pub message_type: MessageType,
}

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// 告警消息
    Alert,
    /// 恢复消息
    Recovery,
}

impl MessageType {
    /// 状态变化对应的消息类型
    pub fn for_transition(event: &TransitionEvent) -> Self {
        if event.up {
            MessageType::Recovery
        } else {
            MessageType::Alert
        }
    }
}

/// 通知发送器trait
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送站点状态变化通知
    async fn send_transition(&self, event: &TransitionEvent) -> Result<()>;

    /// 发送自定义消息
    async fn send_message(&self, message: &NotificationMessage) -> Result<()>;
}
