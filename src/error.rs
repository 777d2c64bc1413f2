//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use crate::site::SiteId;
use thiserror::Error;

/// Site Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum SiteVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 单站点检测错误
    #[error("检测错误: {0}")]
    Check(#[from] CheckError),

    /// 巡检错误
    #[error("巡检错误: {0}")]
    Sweep(#[from] SweepError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 单站点检测错误
///
/// 站点宕机不是错误，探测结果 `up = false` 属于正常结果。
/// 这里只包含会让一次检测操作失败的情况。
#[derive(Error, Debug)]
pub enum CheckError {
    /// URL 无法解析
    #[error("无效的URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// 不支持的协议
    #[error("不支持的协议 {scheme}: {url}")]
    UnsupportedScheme { url: String, scheme: String },

    /// 站点不存在
    #[error("站点不存在: {0}")]
    SiteNotFound(SiteId),

    /// 站点注册表错误
    #[error("站点注册表错误: {0}")]
    Registry(#[from] RegistryError),

    /// 检测历史写入或读取失败
    #[error("检测历史持久化失败: {0}")]
    Persistence(#[from] HistoryError),

    /// 状态变化事件发布失败
    #[error("状态变化事件发布失败: {0}")]
    Publish(#[from] PublishError),

    /// 检测任务异常退出
    #[error("检测任务异常退出: {0}")]
    Aborted(String),
}

/// 检测历史存储错误
#[derive(Error, Debug)]
pub enum HistoryError {
    /// 存储IO错误
    #[error("存储IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 记录编码错误
    #[error("记录编码错误: {0}")]
    Encode(#[from] serde_json::Error),

    /// 历史文件损坏
    #[error("历史文件第 {line} 行损坏: {reason}")]
    Corrupted { line: usize, reason: String },

    /// 存储不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

/// 事件发布错误
#[derive(Error, Debug)]
pub enum PublishError {
    /// HTTP请求错误
    #[error("HTTP请求失败: {0}")]
    Request(#[from] reqwest::Error),

    /// 订阅端拒绝
    #[error("订阅端返回错误状态: {status}")]
    Rejected { status: u16 },

    /// 传输不可用
    #[error("事件传输不可用: {0}")]
    Unavailable(String),
}

/// 站点注册表错误
#[derive(Error, Debug)]
pub enum RegistryError {
    /// URL 无效
    #[error("无效的站点URL: {0}")]
    InvalidUrl(String),

    /// 站点ID冲突
    #[error("站点ID重复: {0}")]
    DuplicateId(SiteId),

    /// 注册表不可用
    #[error("站点注册表不可用: {0}")]
    Unavailable(String),
}

/// 单个站点的失败记录
#[derive(Debug)]
pub struct SiteFailure {
    /// 站点ID
    pub site_id: SiteId,
    /// 失败原因
    pub error: CheckError,
}

/// 巡检错误
#[derive(Error, Debug)]
pub enum SweepError {
    /// 获取站点列表失败，巡检未开始
    #[error("获取站点列表失败: {0}")]
    Registry(#[from] RegistryError),

    /// 部分站点检测失败，其余站点已正常完成
    #[error(
        "{} 个站点检测失败 (共检测 {checked} 个): {}",
        .failures.len(),
        format_failed_sites(.failures)
    )]
    Partial {
        /// 已执行检测的站点数
        checked: usize,
        /// 失败的站点
        failures: Vec<SiteFailure>,
    },
}

impl SweepError {
    /// 失败站点ID列表
    pub fn failed_site_ids(&self) -> Vec<SiteId> {
        match self {
            SweepError::Registry(_) => Vec::new(),
            SweepError::Partial { failures, .. } => failures.iter().map(|f| f.site_id).collect(),
        }
    }
}

fn format_failed_sites(failures: &[SiteFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("#{} ({})", f.site_id, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, SiteVitalsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_error_lists_failed_sites() {
        let err = SweepError::Partial {
            checked: 20,
            failures: vec![SiteFailure {
                site_id: 7,
                error: CheckError::Persistence(HistoryError::Unavailable("disk full".to_string())),
            }],
        };

        let message = err.to_string();
        assert!(message.contains("1 个站点检测失败"));
        assert!(message.contains("#7"));
        assert!(message.contains("disk full"));
        assert_eq!(err.failed_site_ids(), vec![7]);
    }

    #[test]
    fn test_check_error_conversion() {
        let err: CheckError = PublishError::Rejected { status: 503 }.into();
        assert!(matches!(err, CheckError::Publish(_)));

        let top: SiteVitalsError = err.into();
        assert!(top.to_string().contains("503"));
    }
}
