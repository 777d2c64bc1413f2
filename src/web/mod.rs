//! Web API模块
//!
//! 提供按需检测、站点注册、检测历史查询和Prometheus指标接口

use crate::health::{Monitor, Sweeper};
use crate::metrics::CheckMetrics;
use crate::site::MemorySiteRegistry;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod handlers;
pub mod server;

pub use server::{router, WebServer};

/// Web服务共享状态
#[derive(Clone)]
pub struct AppState {
    /// 站点检测器
    pub monitor: Arc<Monitor>,
    /// 巡检器
    pub sweeper: Arc<Sweeper>,
    /// 站点注册表
    pub registry: Arc<MemorySiteRegistry>,
    /// 指标收集器
    pub metrics: Arc<CheckMetrics>,
    /// 停止信号，同时用于取消 `/checkall` 触发的巡检
    pub shutdown: CancellationToken,
    /// 启动时间
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// 创建新的Web服务状态
    pub fn new(
        sweeper: Arc<Sweeper>,
        registry: Arc<MemorySiteRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        let monitor = Arc::clone(sweeper.monitor());
        let metrics = Arc::clone(monitor.metrics());
        Self {
            monitor,
            sweeper,
            registry,
            metrics,
            shutdown,
            start_time: chrono::Utc::now(),
        }
    }
}

/// API响应包装器
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 是否成功
    pub success: bool,
    /// 响应数据
    pub data: Option<T>,
    /// 错误信息
    pub error: Option<String>,
    /// 时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// 创建错误响应
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }

    /// 创建带数据的错误响应
    pub fn error_with_data(message: String, data: T) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_error() {
        let response: ApiResponse<()> = ApiResponse::error("test error".to_string());
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error, Some("test error".to_string()));
    }
}
