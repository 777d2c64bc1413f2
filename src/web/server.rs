//! Web服务器实现
//!
//! 提供HTTP服务器和路由管理

use super::{handlers, AppState};
use crate::config::WebConfig;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// 创建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check/{site_id}", post(handlers::check_site))
        .route("/checkall", post(handlers::check_all))
        .route("/site", post(handlers::add_site))
        .route("/sites", get(handlers::list_sites))
        .route("/sites/{site_id}/checks", get(handlers::site_checks))
        .route("/metrics", get(handlers::metrics))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Web服务器
pub struct WebServer {
    /// 配置
    config: WebConfig,
    /// 共享状态
    state: AppState,
}

impl WebServer {
    /// 创建新的Web服务器
    pub fn new(config: WebConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// 监听地址
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = self
            .config
            .bind_address
            .parse()
            .with_context(|| format!("无效的绑定地址: {}", self.config.bind_address))?;
        Ok(SocketAddr::new(ip, self.config.port))
    }

    /// 启动Web服务器，收到停止信号后优雅退出
    pub async fn start(self) -> Result<()> {
        if !self.config.enabled {
            info!("Web服务器已禁用");
            return Ok(());
        }

        let addr = self.socket_addr()?;
        let shutdown = self.state.shutdown.clone();
        let app = router(self.state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("绑定地址失败: {addr}"))?;

        info!("Web服务器已启动: http://{}", addr);
        info!("Prometheus指标: http://{}/metrics", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("接收到关闭信号，正在关闭Web服务器...");
            })
            .await
            .context("Web服务器运行失败")?;

        info!("Web服务器已关闭");
        Ok(())
    }
}
