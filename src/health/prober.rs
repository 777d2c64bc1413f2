//! HTTP探测器实现
//!
//! 对单个URL执行一次存活探测。传输层失败（DNS、连接拒绝、超时、TLS）
//! 归类为站点宕机，只有URL本身无效才返回错误。

use crate::error::CheckError;
use crate::site::normalize_url;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// 单次探测结果
#[derive(Debug, Clone, PartialEq)]
pub struct PingResult {
    /// 站点是否可达
    pub up: bool,
    /// HTTP状态码（如果收到响应）
    pub status_code: Option<u16>,
    /// 响应时间
    pub response_time: Duration,
    /// 宕机原因
    pub error_message: Option<String>,
}

impl PingResult {
    /// 站点可达
    pub fn up(status_code: u16, response_time: Duration) -> Self {
        Self {
            up: true,
            status_code: Some(status_code),
            response_time,
            error_message: None,
        }
    }

    /// 站点不可达
    pub fn down(error_message: impl Into<String>, response_time: Duration) -> Self {
        Self {
            up: false,
            status_code: None,
            response_time,
            error_message: Some(error_message.into()),
        }
    }

    /// 设置状态码
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// 探测器trait
#[async_trait]
pub trait Prober: Send + Sync {
    /// 探测URL是否存活
    ///
    /// # 参数
    /// * `url` - 站点URL，缺少协议时默认 https
    ///
    /// # 返回
    /// * `Result<PingResult, CheckError>` - 探测结果；只有URL无效时返回错误
    async fn ping(&self, url: &str) -> Result<PingResult, CheckError>;
}

/// HTTP探测器
pub struct HttpProber {
    /// HTTP客户端
    client: Client,
    /// 请求超时时间
    timeout: Duration,
}

impl HttpProber {
    /// 创建新的HTTP探测器
    ///
    /// # 参数
    /// * `timeout` - 单次探测超时时间
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;

        Ok(Self { client, timeout })
    }

    /// 解析并校验URL
    pub fn parse_url(raw: &str) -> Result<Url, CheckError> {
        let normalized = normalize_url(raw);
        let url = Url::parse(&normalized).map_err(|e| CheckError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(CheckError::UnsupportedScheme {
                    url: raw.to_string(),
                    scheme: scheme.to_string(),
                })
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(CheckError::InvalidUrl {
                url: raw.to_string(),
                reason: "缺少主机名".to_string(),
            });
        }

        Ok(url)
    }

    /// 格式化请求错误信息
    fn format_request_error(error: &reqwest::Error) -> String {
        if error.is_timeout() {
            "Request timeout".to_string()
        } else if error.is_connect() {
            "Connection refused".to_string()
        } else if error.is_redirect() {
            "Too many redirects".to_string()
        } else if error.is_request() {
            "Invalid request".to_string()
        } else {
            let error_str = error.to_string();
            if error_str.contains("dns") || error_str.contains("DNS") {
                "DNS resolution failed".to_string()
            } else if error_str.contains("certificate")
                || error_str.contains("tls")
                || error_str.contains("ssl")
            {
                "SSL/TLS certificate error".to_string()
            } else {
                format!("Request failed: {error_str}")
            }
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn ping(&self, url: &str) -> Result<PingResult, CheckError> {
        let url = Self::parse_url(url)?;
        let start_time = Instant::now();

        let response = timeout(self.timeout, self.client.get(url.clone()).send()).await;
        let response_time = start_time.elapsed();

        let result = match response {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.as_u16() < 400 {
                    PingResult::up(status.as_u16(), response_time)
                } else {
                    PingResult::down(
                        format!(
                            "HTTP {} {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown")
                        ),
                        response_time,
                    )
                    .with_status_code(status.as_u16())
                }
            }
            Ok(Err(e)) => PingResult::down(Self::format_request_error(&e), response_time),
            Err(_) => PingResult::down("Request timeout", response_time),
        };

        debug!(
            "探测完成: {} up={} ({}ms)",
            url,
            result.up,
            result.response_time.as_millis()
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prober() -> HttpProber {
        HttpProber::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_ping_success_status_is_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/health").with_status(200).create_async().await;

        let result = prober().ping(&format!("{}/health", server.url())).await.unwrap();

        mock.assert_async().await;
        assert!(result.up);
        assert_eq!(result.status_code, Some(200));
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_ping_error_status_is_down() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/").with_status(503).create_async().await;

        let result = prober().ping(&server.url()).await.unwrap();

        assert!(!result.up);
        assert_eq!(result.status_code, Some(503));
        assert!(result.error_message.unwrap().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_ping_client_error_status_is_down() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/missing").with_status(404).create_async().await;

        let result = prober().ping(&format!("{}/missing", server.url())).await.unwrap();
        assert!(!result.up);
    }

    #[tokio::test]
    async fn test_ping_connection_refused_is_down_not_error() {
        // 端口 1 上通常没有监听者
        let result = prober().ping("http://127.0.0.1:1/").await;

        let result = result.expect("传输层失败不应返回错误");
        assert!(!result.up);
        assert!(result.error_message.is_some());
    }

    #[test]
    fn test_parse_url_rejects_unsupported_scheme() {
        let err = HttpProber::parse_url("ftp://example.com").unwrap_err();
        assert!(matches!(err, CheckError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"));
    }

    #[test]
    fn test_parse_url_rejects_malformed_url() {
        let err = HttpProber::parse_url("http://exa mple.com").unwrap_err();
        assert!(matches!(err, CheckError::InvalidUrl { .. }));
    }

    #[test]
    fn test_parse_url_defaults_scheme() {
        let url = HttpProber::parse_url("example.com/health").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/health");
    }
}
