//! 状态变化通知订阅者
//!
//! 从广播通道接收状态变化事件并转发给通知发送器

use crate::events::TransitionEvent;
use crate::notification::sender::NotificationSender;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 状态变化通知器
pub struct TransitionNotifier {
    sender: Arc<dyn NotificationSender>,
}

impl TransitionNotifier {
    /// 创建新的通知器
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    /// 在后台消费事件，直到通道关闭或收到停止信号
    pub fn spawn(
        self,
        receiver: broadcast::Receiver<TransitionEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(receiver, shutdown).await })
    }

    /// 消费事件循环
    pub async fn run(
        &self,
        mut receiver: broadcast::Receiver<TransitionEvent>,
        shutdown: CancellationToken,
    ) {
        info!("状态变化通知器已启动");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("通知器收到停止信号");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => self.deliver(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("通知器处理过慢，丢弃了 {} 个状态变化事件", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("状态变化通道已关闭");
                        break;
                    }
                },
            }
        }

        info!("状态变化通知器已停止");
    }

    async fn deliver(&self, event: &TransitionEvent) {
        // 通知失败不影响检测流程，只记录日志
        if let Err(e) = self.sender.send_transition(event).await {
            error!("发送站点 #{} 状态变化通知失败: {}", event.site.id, e);
        }
    }
}
