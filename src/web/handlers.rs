//! Web 路由处理函数
//!
//! 所有检测请求都经过 `Monitor::check_one`，与定时巡检共用同一条路径

use super::{ApiResponse, AppState};
use crate::error::{CheckError, RegistryError, SweepError};
use crate::health::{CheckOutcome, CheckRecord, SweepReport};
use crate::site::{Site, SiteId, SiteRegistry};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// 历史查询默认条数
const DEFAULT_CHECKS_LIMIT: usize = 20;
/// 历史查询最大条数
const MAX_CHECKS_LIMIT: usize = 1000;

/// API 错误，携带HTTP状态码
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// 创建新的API错误
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// HTTP状态码
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

impl From<CheckError> for ApiError {
    fn from(err: CheckError) -> Self {
        let status = match err {
            CheckError::SiteNotFound(_) => StatusCode::NOT_FOUND,
            CheckError::InvalidUrl { .. } | CheckError::UnsupportedScheme { .. } => {
                StatusCode::BAD_REQUEST
            }
            CheckError::Registry(_)
            | CheckError::Persistence(_)
            | CheckError::Publish(_)
            | CheckError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match err {
            RegistryError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            RegistryError::DuplicateId(_) => StatusCode::CONFLICT,
            RegistryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

/// 新增站点请求
#[derive(Debug, Deserialize)]
pub struct AddSiteRequest {
    /// 站点URL，缺少协议时默认 https
    pub url: String,
}

/// 历史查询参数
#[derive(Debug, Deserialize)]
pub struct ChecksQuery {
    /// 返回条数
    pub limit: Option<usize>,
}

/// 巡检部分失败时的响应数据
#[derive(Debug, Serialize)]
pub struct SweepFailureBody {
    /// 已执行检测的站点数
    pub checked: usize,
    /// 失败的站点ID
    pub failed_sites: Vec<SiteId>,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 服务状态
    pub status: &'static str,
    /// 版本信息
    pub version: &'static str,
    /// 运行时间
    pub uptime_seconds: u64,
}

/// 检测单个站点
pub async fn check_site(
    State(state): State<AppState>,
    Path(site_id): Path<SiteId>,
) -> Result<Json<ApiResponse<CheckOutcome>>, ApiError> {
    let outcome = state.monitor.check_one(site_id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// 检测所有站点
pub async fn check_all(State(state): State<AppState>) -> Response {
    let cancel = state.shutdown.child_token();

    match state.sweeper.sweep_all(&cancel).await {
        Ok(report) => Json(ApiResponse::<SweepReport>::success(report)).into_response(),
        Err(err @ SweepError::Partial { .. }) => {
            warn!("按需巡检部分失败: {}", err);
            let failed_sites = err.failed_site_ids();
            let checked = match &err {
                SweepError::Partial { checked, .. } => *checked,
                SweepError::Registry(_) => 0,
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error_with_data(
                    err.to_string(),
                    SweepFailureBody {
                        checked,
                        failed_sites,
                    },
                )),
            )
                .into_response()
        }
        Err(err) => {
            error!("按需巡检失败: {}", err);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// 注册新站点
pub async fn add_site(
    State(state): State<AppState>,
    Json(request): Json<AddSiteRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Site>>), ApiError> {
    if request.url.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "站点URL不能为空"));
    }

    let site = state.registry.add(request.url.trim()).await?;
    info!("通过API注册站点: #{} {}", site.id, site.url);
    Ok((StatusCode::CREATED, Json(ApiResponse::success(site))))
}

/// 列出所有站点
pub async fn list_sites(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Site>>>, ApiError> {
    let sites = state.registry.list().await?;
    Ok(Json(ApiResponse::success(sites)))
}

/// 查询站点最近的检测记录
pub async fn site_checks(
    State(state): State<AppState>,
    Path(site_id): Path<SiteId>,
    Query(query): Query<ChecksQuery>,
) -> Result<Json<ApiResponse<Vec<CheckRecord>>>, ApiError> {
    if state.registry.get(site_id).await?.is_none() {
        return Err(CheckError::SiteNotFound(site_id).into());
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_CHECKS_LIMIT)
        .min(MAX_CHECKS_LIMIT);

    let records = state
        .monitor
        .history()
        .recent(site_id, limit)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ApiResponse::success(records)))
}

/// Prometheus指标
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.gather() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("导出指标失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "导出指标失败").into_response()
        }
    }
}

/// 服务健康检查
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = chrono::Utc::now() - state.start_time;
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;

    #[test]
    fn test_check_error_status_mapping() {
        assert_eq!(
            ApiError::from(CheckError::SiteNotFound(9)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(CheckError::UnsupportedScheme {
                url: "ftp://example.com".to_string(),
                scheme: "ftp".to_string(),
            })
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CheckError::Persistence(HistoryError::Unavailable(
                "down".to_string()
            )))
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_registry_error_status_mapping() {
        assert_eq!(
            ApiError::from(RegistryError::InvalidUrl("::".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(RegistryError::DuplicateId(1)).status(),
            StatusCode::CONFLICT
        );
    }
}
