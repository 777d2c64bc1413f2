//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::site::Site;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// 主配置结构，包含全局配置和站点列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    pub global: GlobalConfig,
    /// 站点配置列表
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 巡检间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 日志文件路径
    pub log_file: Option<PathBuf>,
    /// 是否输出到控制台
    #[serde(default = "default_log_console")]
    pub log_console: bool,
    /// 是否使用JSON格式输出日志
    #[serde(default)]
    pub log_json: bool,
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 最大并发检测数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,
    /// 检测历史文件路径，不配置时只保存在内存中
    pub history_path: Option<PathBuf>,
    /// 同一站点的检测是否串行执行
    #[serde(default)]
    pub serialize_site_checks: bool,
    /// 状态变化事件推送地址
    pub transition_webhook_url: Option<String>,
    /// 默认飞书webhook URL
    pub default_feishu_webhook_url: Option<String>,
    /// 飞书签名密钥
    pub feishu_secret: Option<String>,
    /// 消息模板
    pub message_template: Option<String>,
    /// 模块级别日志，如 `reqwest = "warn"`
    #[serde(default)]
    pub log_modules: HashMap<String, String>,
    /// Web 服务器配置
    pub web: Option<WebConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            log_level: default_log_level(),
            log_file: None,
            log_console: default_log_console(),
            log_json: false,
            log_modules: HashMap::new(),
            request_timeout_seconds: default_timeout(),
            max_concurrent_checks: default_max_concurrent(),
            history_path: None,
            serialize_site_checks: false,
            transition_webhook_url: None,
            default_feishu_webhook_url: None,
            feishu_secret: None,
            message_template: None,
            web: None,
        }
    }
}

/// 站点配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    /// 站点ID
    pub id: u64,
    /// 站点URL
    pub url: String,
}

impl From<&SiteConfig> for Site {
    fn from(config: &SiteConfig) -> Self {
        Site::new(config.id, crate::site::normalize_url(&config.url))
    }
}

/// Web 服务器配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 是否启用 Web 功能
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    /// 监听端口
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// 绑定地址
    #[serde(default = "default_web_bind_address")]
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            port: default_web_port(),
            bind_address: default_web_bind_address(),
        }
    }
}

// 默认值函数
fn default_check_interval() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_console() -> bool {
    true
}
fn default_timeout() -> u64 {
    10
}
fn default_max_concurrent() -> usize {
    8
}
fn default_web_enabled() -> bool {
    false
}
fn default_web_port() -> u16 {
    8080
}
fn default_web_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.global.check_interval_seconds == 0 {
        return Err("巡检间隔不能为0".to_string());
    }

    if config.global.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.global.max_concurrent_checks == 0 {
        return Err("最大并发检测数不能为0".to_string());
    }

    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }
    for (module, level) in &config.global.log_modules {
        if !valid_log_levels.contains(&level.as_str()) {
            return Err(format!("模块 {module} 的日志级别无效: {level}"));
        }
    }
    if !config.global.log_console && config.global.log_file.is_none() {
        return Err("关闭控制台日志时必须配置 log_file".to_string());
    }

    if let Some(ref url) = config.global.transition_webhook_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(format!("状态变化推送地址格式无效: {url}"));
        }
    }

    if let Some(ref web_config) = config.global.web {
        if web_config.enabled {
            if web_config.port == 0 {
                return Err("无效的Web服务器端口: 0，端口不能为0".to_string());
            }
            if web_config.bind_address.is_empty() {
                return Err("Web服务器绑定地址不能为空".to_string());
            }
        }
    }

    let mut seen = HashSet::new();
    for site in &config.sites {
        if site.url.trim().is_empty() {
            return Err(format!("站点 #{} 的URL不能为空", site.id));
        }

        // 没有协议的URL默认https，显式协议只允许http/https
        if let Some((scheme, _)) = site.url.split_once("://") {
            if scheme != "http" && scheme != "https" {
                return Err(format!("站点 #{} 的URL格式无效: {}", site.id, site.url));
            }
        }

        if !seen.insert(site.id) {
            return Err(format!("站点ID重复: {}", site.id));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            global: GlobalConfig::default(),
            sites: vec![
                SiteConfig {
                    id: 1,
                    url: "https://example.com".to_string(),
                },
                SiteConfig {
                    id: 2,
                    url: "example.org".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = create_test_config();

        let serialized = toml::to_string(&config).expect("序列化失败");
        assert!(!serialized.is_empty());

        let deserialized: Config = toml::from_str(&serialized).expect("反序列化失败");
        assert_eq!(
            config.global.check_interval_seconds,
            deserialized.global.check_interval_seconds
        );
        assert_eq!(config.sites, deserialized.sites);
    }

    #[test]
    fn test_config_validation() {
        assert!(validate_config(&create_test_config()).is_ok());
    }

    #[test]
    fn test_config_validation_allows_empty_sites() {
        let mut config = create_test_config();
        config.sites.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation_log_settings() {
        let mut config = create_test_config();
        config
            .global
            .log_modules
            .insert("reqwest".to_string(), "verbose".to_string());
        assert!(validate_config(&config).unwrap_err().contains("reqwest"));

        let mut config = create_test_config();
        config.global.log_console = false;
        assert!(validate_config(&config).is_err());
        config.global.log_file = Some(PathBuf::from("logs/site-vitals.log"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation_duplicate_site_id() {
        let mut config = create_test_config();
        config.sites[1].id = 1;

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("站点ID重复"));
    }

    #[test]
    fn test_config_validation_invalid_scheme() {
        let mut config = create_test_config();
        config.sites[0].url = "ftp://example.com".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("URL格式无效"));
    }

    #[test]
    fn test_config_validation_zero_concurrency() {
        let mut config = create_test_config();
        config.global.max_concurrent_checks = 0;

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("最大并发检测数"));
    }

    #[test]
    fn test_default_values() {
        let global_config = GlobalConfig::default();

        assert_eq!(global_config.check_interval_seconds, 300);
        assert_eq!(global_config.log_level, "info");
        assert_eq!(global_config.request_timeout_seconds, 10);
        assert_eq!(global_config.max_concurrent_checks, 8);
        assert!(!global_config.serialize_site_checks);
        assert!(global_config.history_path.is_none());
    }

    #[test]
    fn test_web_config_default() {
        let web_config = WebConfig::default();

        assert!(!web_config.enabled);
        assert_eq!(web_config.port, 8080);
        assert_eq!(web_config.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_site_config_into_site_normalizes_url() {
        let config = create_test_config();
        let site: Site = (&config.sites[1]).into();
        assert_eq!(site, Site::new(2, "https://example.org"));
    }
}
