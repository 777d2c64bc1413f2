//! 事件发布器实现
//!
//! 进程内广播、HTTP webhook 以及多路扇出三种发布方式

use super::TransitionEvent;
use crate::error::PublishError;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 状态变化通道容量
const TRANSITION_CHANNEL_CAPACITY: usize = 1024;

/// 事件发布器trait
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 发布状态变化事件
    ///
    /// 返回错误时调用方不能写入对应的检测记录。
    async fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError>;
}

/// 进程内广播发布器
///
/// 任意数量的订阅者各自收到每一个事件。没有订阅者时发布视为成功。
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<TransitionEvent>,
}

impl BroadcastPublisher {
    /// 创建新的广播发布器
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// 订阅状态变化事件
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.sender.subscribe()
    }

    /// 当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                debug!(
                    "状态变化事件已广播: #{} up={} (订阅者 {})",
                    event.site.id, event.up, receivers
                );
            }
            Err(_) => {
                debug!("状态变化事件无订阅者: #{} up={}", event.site.id, event.up);
            }
        }
        Ok(())
    }
}

/// HTTP webhook 发布器
///
/// 以JSON形式POST事件，非2xx响应视为发布失败。
pub struct WebhookPublisher {
    client: Client,
    url: String,
}

impl WebhookPublisher {
    /// 创建新的webhook发布器
    ///
    /// # 参数
    /// * `url` - 接收事件的地址
    /// * `timeout` - 请求超时时间
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for WebhookPublisher {
    async fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError> {
        let response = self.client.post(&self.url).json(event).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected {
                status: status.as_u16(),
            });
        }

        info!(
            "状态变化事件已推送: #{} up={} -> {}",
            event.site.id, event.up, self.url
        );
        Ok(())
    }
}

/// 多路扇出发布器
///
/// 并发发布到所有下游，任一下游失败即整体失败。
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    /// 创建扇出发布器
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, event: &TransitionEvent) -> Result<(), PublishError> {
        let results = join_all(self.publishers.iter().map(|p| p.publish(event))).await;
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Site;

    fn event(up: bool) -> TransitionEvent {
        TransitionEvent::new(Site::new(1, "https://example.com"), up)
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_every_subscriber() {
        let publisher = BroadcastPublisher::new();
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.publish(&event(false)).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), event(false));
        assert_eq!(second.recv().await.unwrap(), event(false));
        assert_eq!(publisher.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_succeeds() {
        let publisher = BroadcastPublisher::new();
        assert!(publisher.publish(&event(true)).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_posts_event_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transitions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "site": {"id": 1, "url": "https://example.com"},
                "up": false
            })))
            .with_status(202)
            .create_async()
            .await;

        let publisher =
            WebhookPublisher::new(format!("{}/transitions", server.url()), Duration::from_secs(5))
                .unwrap();
        publisher.publish(&event(false)).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_rejection_is_publish_error() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/").with_status(500).create_async().await;

        let publisher = WebhookPublisher::new(server.url(), Duration::from_secs(5)).unwrap();
        let result = publisher.publish(&event(true)).await;

        assert!(matches!(result, Err(PublishError::Rejected { status: 500 })));
    }

    #[tokio::test]
    async fn test_fanout_fails_when_any_publisher_fails() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/").with_status(500).create_async().await;

        let broadcast = BroadcastPublisher::new();
        let mut receiver = broadcast.subscribe();
        let webhook = WebhookPublisher::new(server.url(), Duration::from_secs(5)).unwrap();

        let fanout = FanoutPublisher::new(vec![Arc::new(broadcast), Arc::new(webhook)]);
        assert!(fanout.publish(&event(false)).await.is_err());

        // 广播端已经收到，重复投递由订阅端处理
        assert_eq!(receiver.recv().await.unwrap(), event(false));
    }
}
