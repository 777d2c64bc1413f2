//! 日志系统模块
//!
//! 基于 tracing 的结构化日志。`log` 宏的输出通过 LogTracer 桥接到 tracing，
//! 全局只初始化一次，重复调用直接复用第一次的结果。

use log::LevelFilter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};
use crate::config::GlobalConfig;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 初始化失败原因
    init_error: Option<String>,
    /// 当前配置
    current_config: Option<LogConfig>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

fn global_state() -> MutexGuard<'static, GlobalLoggingState> {
    GLOBAL_LOGGING_STATE
        .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选）
    pub file_path: Option<PathBuf>,
    /// 是否输出到控制台
    pub console: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            console: true,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 以指定级别创建控制台日志配置
    pub fn with_level(level: &str) -> Self {
        Self {
            level: parse_level(level),
            ..Self::default()
        }
    }

    /// 从全局配置创建日志配置
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            level: parse_level(&global.log_level),
            file_path: global.log_file.clone(),
            console: global.log_console,
            json_format: global.log_json,
            module_levels: global
                .log_modules
                .iter()
                .map(|(module, level)| (module.clone(), parse_level(level)))
                .collect(),
        }
    }
}

/// 解析日志级别字符串，无法识别时使用 info
pub fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

/// 日志系统
#[derive(Debug)]
pub struct LoggingSystem {
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 已经初始化过时不再重复安装subscriber，返回新的句柄。
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        {
            let state = global_state();
            if state.initialized {
                return match &state.init_error {
                    None => Ok(Self { config }),
                    Some(e) => Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e)),
                };
            }
        }

        let init_result = Self::init_log_tracer().and_then(|_| Self::init_tracing_subscriber(&config));

        let mut state = global_state();
        state.initialized = true;
        state.current_config = Some(config.clone());
        state.init_error = init_result.as_ref().err().map(|e| e.to_string());
        init_result?;

        Ok(Self { config })
    }

    /// 当前句柄使用的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        GLOBAL_LOGGING_STATE
            .get()
            .is_some_and(|_| global_state().initialized)
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        GLOBAL_LOGGING_STATE.get()?;
        global_state().current_config.clone()
    }

    /// 初始化 LogTracer（log crate 到 tracing 的桥接）
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        LOG_TRACER_INIT
            .get_or_init(|| LogTracer::init().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    fn build_filter(config: &LogConfig) -> EnvFilter {
        let mut env_filter =
            EnvFilter::from_default_env().add_directive(Self::level_directive(config.level));

        for (module, level) in &config.module_levels {
            match format!("{}={}", module, Self::level_to_string(*level)).parse::<Directive>() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(e) => eprintln!("忽略无效的模块日志级别 {module}: {e}"),
            }
        }

        env_filter
    }

    /// 日志文件输出层
    fn file_layer(config: &LogConfig, file_path: &std::path::Path) -> anyhow::Result<BoxedLayer> {
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| anyhow::anyhow!("创建日志目录失败: {}", e))?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)
            .map_err(|e| anyhow::anyhow!("创建日志文件失败: {}", e))?;
        let writer = Mutex::new(file);

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_filter(Self::build_filter(config))
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_file(true)
                .with_line_number(true)
                .with_filter(Self::build_filter(config))
                .boxed()
        };
        Ok(layer)
    }

    /// 控制台输出层
    fn console_layer(config: &LogConfig) -> BoxedLayer {
        if config.json_format {
            fmt::layer()
                .json()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_file(true)
                .with_line_number(true)
                .with_filter(Self::build_filter(config))
                .boxed()
        } else {
            fmt::layer()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_filter(Self::build_filter(config))
                .boxed()
        }
    }

    /// 初始化 tracing subscriber
    ///
    /// 配置了日志文件时写入文件；`console` 为 true 或没有日志文件时同时输出到控制台。
    fn init_tracing_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let mut layers: Vec<BoxedLayer> = Vec::new();
        if let Some(file_path) = &config.file_path {
            layers.push(Self::file_layer(config, file_path)?);
        }
        if config.console || config.file_path.is_none() {
            layers.push(Self::console_layer(config));
        }

        let result = registry().with(layers).try_init();

        match result {
            Ok(()) => {
                tracing::info!("日志系统初始化完成");
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                // LogTracer 已安装，或测试中其他用例已经安装了全局subscriber
                if error_msg.contains(
                    "attempted to set a logger after the logging system was already initialized",
                ) || error_msg.contains("a global default trace dispatcher has already been set")
                {
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("tracing subscriber初始化失败: {}", error_msg))
                }
            }
        }
    }

    fn level_directive(level: LevelFilter) -> Directive {
        match level {
            LevelFilter::Off => Directive::from(tracing::level_filters::LevelFilter::OFF),
            LevelFilter::Error => Directive::from(tracing::Level::ERROR),
            LevelFilter::Warn => Directive::from(tracing::Level::WARN),
            LevelFilter::Info => Directive::from(tracing::Level::INFO),
            LevelFilter::Debug => Directive::from(tracing::Level::DEBUG),
            LevelFilter::Trace => Directive::from(tracing::Level::TRACE),
        }
    }

    fn level_to_string(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        }
    }

    /// 重置日志系统状态（主要用于测试）
    #[cfg(test)]
    pub fn reset_for_testing() {
        if GLOBAL_LOGGING_STATE.get().is_some() {
            *global_state() = GlobalLoggingState::default();
        }
    }
}
