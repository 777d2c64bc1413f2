//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的 `${VAR_NAME}` 环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {e}")))?;

        let mut result = content.to_string();

        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(full_match, &value);
                }
                Err(_) => {
                    return Err(ConfigError::EnvVarError {
                        var: var_name.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(result)
    }

    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {e}")))?;

        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {e}")))?;

        let config = self.parse_toml(&content)?;
        self.validate(&config)?;

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {config:?}");

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// 当前目录存在 `config.toml` 时优先使用，否则使用用户配置目录。
pub fn get_default_config_path() -> std::path::PathBuf {
    if std::path::Path::new("config.toml").exists() {
        return std::path::PathBuf::from("config.toml");
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("site-vitals").join("config.toml"))
        .unwrap_or_else(|| std::path::PathBuf::from("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::NamedTempFile;

    const TEST_CONFIG_TOML: &str = r#"
[global]
check_interval_seconds = 60
log_level = "info"
request_timeout_seconds = 5
max_concurrent_checks = 8

[[sites]]
id = 1
url = "https://example.com"

[[sites]]
id = 2
url = "example.org"
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[global]
default_feishu_webhook_url = "${SITE_VITALS_TEST_WEBHOOK}"

[[sites]]
id = 1
url = "https://${SITE_VITALS_TEST_HOST}/health"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.check_interval_seconds, 60);
        assert_eq!(config.global.request_timeout_seconds, 5);
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[1].url, "example.org");
    }

    #[tokio::test]
    async fn test_minimal_config_uses_defaults() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string("[global]\n").await.unwrap();

        assert_eq!(config.global.check_interval_seconds, 300);
        assert_eq!(config.global.max_concurrent_checks, 8);
        assert!(config.sites.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("SITE_VITALS_TEST_WEBHOOK", "https://test.webhook.url");
        env::set_var("SITE_VITALS_TEST_HOST", "status.example.com");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(
            config.global.default_feishu_webhook_url,
            Some("https://test.webhook.url".to_string())
        );
        assert_eq!(config.sites[0].url, "https://status.example.com/health");

        env::remove_var("SITE_VITALS_TEST_WEBHOOK");
        env::remove_var("SITE_VITALS_TEST_HOST");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        env::remove_var("SITE_VITALS_MISSING_VAR");
        let config_with_missing_var = r#"
[global]
default_feishu_webhook_url = "${SITE_VITALS_MISSING_VAR}"
"#;

        let loader = TomlConfigLoader::new(true);
        let result = loader.load_from_string(config_with_missing_var).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("SITE_VITALS_MISSING_VAR"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), TEST_CONFIG_TOML).unwrap();

        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_file(file.path()).await.unwrap();
        assert_eq!(config.sites.len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let loader = TomlConfigLoader::new(false);
        let result = loader.load_from_file("/nonexistent/site-vitals.toml").await;
        assert!(result.unwrap_err().to_string().contains("配置文件不存在"));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }
}
