//! 飞书通知发送器模块
//!
//! 实现飞书webhook通知功能，支持签名校验

use crate::events::TransitionEvent;
use crate::notification::sender::{MessageType, NotificationMessage, NotificationSender};
use crate::notification::template::{HandlebarsTemplate, MessageTemplate, TemplateContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info};

/// 飞书通知发送器
pub struct FeishuSender {
    /// HTTP客户端
    client: Client,
    /// webhook URL
    webhook_url: String,
    /// 签名密钥
    secret: Option<String>,
    /// 消息模板
    template: HandlebarsTemplate,
}

impl FeishuSender {
    /// 创建新的飞书发送器
    ///
    /// # 参数
    /// * `webhook_url` - webhook URL
    /// * `secret` - 签名密钥（可选）
    /// * `template` - 消息模板
    pub fn new(
        webhook_url: impl Into<String>,
        secret: Option<String>,
        template: HandlebarsTemplate,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("创建HTTP客户端失败")?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            secret,
            template,
        })
    }

    /// 计算飞书签名
    ///
    /// 以 `timestamp\nsecret` 为密钥对空消息做 HMAC-SHA256，再做 base64 编码。
    pub fn sign(timestamp: i64, secret: &str) -> Result<String> {
        let string_to_sign = format!("{timestamp}\n{secret}");
        let mac = Hmac::<Sha256>::new_from_slice(string_to_sign.as_bytes())
            .map_err(|e| anyhow::anyhow!("签名密钥无效: {e}"))?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// 构建飞书消息体
    fn build_message_body(&self, message: &NotificationMessage) -> Result<Value> {
        let color = match message.message_type {
            MessageType::Alert => "red",
            MessageType::Recovery => "green",
        };

        let mut body = json!({
            "msg_type": "interactive",
            "card": {
                "elements": [
                    {
                        "tag": "div",
                        "text": {
                            "content": message.content,
                            "tag": "lark_md"
                        }
                    }
                ],
                "header": {
                    "title": {
                        "content": message.title,
                        "tag": "plain_text"
                    },
                    "template": color
                }
            }
        });

        if let Some(ref secret) = self.secret {
            let timestamp = chrono::Utc::now().timestamp();
            body["timestamp"] = json!(timestamp.to_string());
            body["sign"] = json!(Self::sign(timestamp, secret)?);
        }

        Ok(body)
    }

    /// 发送消息到飞书
    async fn send_to_webhook(&self, body: &Value) -> Result<()> {
        debug!("发送消息到飞书webhook: {}", self.webhook_url);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(body)
            .send()
            .await
            .context("发送飞书消息失败")?;

        if response.status().is_success() {
            info!("飞书消息发送成功");
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("飞书消息发送失败: {} - {}", status, text);
            Err(anyhow::anyhow!("飞书消息发送失败: {}", status))
        }
    }
}

#[async_trait]
impl NotificationSender for FeishuSender {
    async fn send_transition(&self, event: &TransitionEvent) -> Result<()> {
        let context = TemplateContext::from_event(event, chrono::Utc::now());
        let content = self.template.render(&context)?;

        let message = NotificationMessage {
            title: if event.up {
                format!("✅ 站点恢复 - #{}", event.site.id)
            } else {
                format!("🚨 站点告警 - #{}", event.site.id)
            },
            content,
            message_type: MessageType::for_transition(event),
        };

        self.send_message(&message).await
    }

    async fn send_message(&self, message: &NotificationMessage) -> Result<()> {
        let body = self.build_message_body(message)?;
        self.send_to_webhook(&body).await
    }
}
