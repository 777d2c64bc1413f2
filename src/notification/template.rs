//! 消息模板模块
//!
//! 使用Handlebars渲染状态变化通知

use crate::error::NotificationError;
use crate::events::TransitionEvent;
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;

const TEMPLATE_NAME: &str = "transition";

/// 模板上下文数据
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    /// 站点ID
    pub site_id: u64,
    /// 站点URL
    pub site_url: String,
    /// 站点是否可达
    pub up: bool,
    /// 状态文字
    pub status: String,
    /// 时间戳
    pub timestamp: String,
}

impl TemplateContext {
    /// 由状态变化事件构建上下文
    pub fn from_event(event: &TransitionEvent, at: DateTime<Utc>) -> Self {
        Self {
            site_id: event.site.id,
            site_url: event.site.url.clone(),
            up: event.up,
            status: if event.up { "正常" } else { "不可达" }.to_string(),
            timestamp: at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

/// 消息模板trait
pub trait MessageTemplate: Send + Sync {
    /// 渲染模板
    fn render(&self, context: &TemplateContext) -> Result<String, NotificationError>;
}

/// Handlebars模板
pub struct HandlebarsTemplate {
    registry: Handlebars<'static>,
}

impl HandlebarsTemplate {
    /// 创建新的Handlebars模板，模板语法错误会立即返回
    pub fn new(template: &str) -> Result<Self, NotificationError> {
        let mut registry = Handlebars::new();
        // 消息是飞书markdown，不做HTML转义
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;

        Ok(Self { registry })
    }
}

impl Default for HandlebarsTemplate {
    fn default() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        // 内置模板的语法由单元测试保证
        let _ = registry.register_template_string(TEMPLATE_NAME, default_transition_template());
        Self { registry }
    }
}

impl MessageTemplate for HandlebarsTemplate {
    fn render(&self, context: &TemplateContext) -> Result<String, NotificationError> {
        self.registry
            .render(TEMPLATE_NAME, context)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))
    }
}

/// 默认的状态变化消息模板
pub fn default_transition_template() -> &'static str {
    r#"{{#if up}}✅ **站点恢复**{{else}}🚨 **站点不可达**{{/if}}
- **站点**: #{{site_id}}
- **URL**: {{site_url}}
- **当前状态**: {{status}}
- **检测时间**: {{timestamp}}"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Site;

    fn context(up: bool) -> TemplateContext {
        let event = TransitionEvent::new(Site::new(3, "https://example.com"), up);
        TemplateContext::from_event(&event, Utc::now())
    }

    #[test]
    fn test_default_template_is_valid() {
        assert!(HandlebarsTemplate::new(default_transition_template()).is_ok());
    }

    #[test]
    fn test_render_down_message() {
        let template = HandlebarsTemplate::default();
        let message = template.render(&context(false)).unwrap();

        assert!(message.contains("站点不可达"));
        assert!(message.contains("#3"));
        assert!(message.contains("https://example.com"));
    }

    #[test]
    fn test_render_recovery_message() {
        let template = HandlebarsTemplate::default();
        let message = template.render(&context(true)).unwrap();
        assert!(message.contains("站点恢复"));
    }

    #[test]
    fn test_custom_template() {
        let template = HandlebarsTemplate::new("{{site_url}} up={{up}}").unwrap();
        let message = template.render(&context(false)).unwrap();
        assert_eq!(message, "https://example.com up=false");
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let result = HandlebarsTemplate::new("{{#if up}}unterminated");
        assert!(matches!(result, Err(NotificationError::TemplateError(_))));
    }
}
