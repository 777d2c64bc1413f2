//! 站点模块
//!
//! 站点数据结构、URL规范化和站点注册表

pub mod registry;

use serde::{Deserialize, Serialize};

pub use registry::{MemorySiteRegistry, SiteRegistry};

/// 站点ID
pub type SiteId = u64;

/// 被监控的站点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// 站点ID
    pub id: SiteId,
    /// 站点URL
    pub url: String,
}

impl Site {
    /// 创建新的站点
    pub fn new(id: SiteId, url: impl Into<String>) -> Self {
        Self { id, url: url.into() }
    }
}

/// 规范化站点URL
///
/// 没有协议前缀的URL默认使用 `https://`，首尾空白会被去除。
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_defaults_to_https() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("  example.com/health "), "https://example.com/health");
    }

    #[test]
    fn test_normalize_url_keeps_scheme() {
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("ftp://example.com"), "ftp://example.com");
    }
}
