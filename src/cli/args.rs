//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::site::SiteId;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Site Vitals - 站点可用性监控工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "site-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "SITE_VITALS_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，不指定时使用配置文件中的设置
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "SITE_VITALS_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 日志文件路径，覆盖配置文件中的 log_file
    #[arg(long, value_name = "FILE", help = "日志文件路径", env = "SITE_VITALS_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志")]
    pub log_json: bool,

    /// 是否启用详细输出
    #[arg(short, long, help = "启用详细输出")]
    pub verbose: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动定时巡检服务
    Start {
        /// 巡检间隔（秒）
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            help = "巡检间隔（秒）",
            env = "SITE_VITALS_INTERVAL",
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        interval: Option<u64>,

        /// 最大并发检测数
        #[arg(
            long,
            value_name = "COUNT",
            help = "最大并发检测数",
            env = "SITE_VITALS_MAX_CONCURRENT",
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        max_concurrent: Option<usize>,
    },

    /// 执行一次性检测
    Check {
        /// 站点ID（可选，不指定则检测所有站点）
        #[arg(value_name = "SITE_ID", help = "站点ID")]
        site: Option<SiteId>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 初始化配置文件
    Init {
        /// 配置文件路径
        #[arg(
            value_name = "FILE",
            help = "配置文件路径",
            default_value = "config.toml"
        )]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }

    /// 是否启用详细输出
    pub fn is_verbose(&self) -> bool {
        self.verbose || matches!(self.log_level, Some(LogLevel::Debug | LogLevel::Trace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_with_site_id() {
        let args = Args::try_parse_from(["site-vitals", "check", "7", "--format", "json"]).unwrap();
        match args.command {
            Commands::Check { site, format } => {
                assert_eq!(site, Some(7));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_start_overrides() {
        let args = Args::try_parse_from([
            "site-vitals",
            "--config",
            "/tmp/site-vitals.toml",
            "start",
            "--interval",
            "60",
            "--max-concurrent",
            "4",
        ])
        .unwrap();

        assert_eq!(args.get_config_path(), PathBuf::from("/tmp/site-vitals.toml"));
        match args.command {
            Commands::Start {
                interval,
                max_concurrent,
            } => {
                assert_eq!(interval, Some(60));
                assert_eq!(max_concurrent, Some(4));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbose_from_log_level() {
        let args =
            Args::try_parse_from(["site-vitals", "--log-level", "debug", "version"]).unwrap();
        assert!(args.is_verbose());
    }

    #[test]
    fn test_parse_log_output_flags() {
        let args = Args::try_parse_from([
            "site-vitals",
            "--log-file",
            "logs/site-vitals.log",
            "--log-json",
            "version",
        ])
        .unwrap();
        assert_eq!(args.log_file, Some(PathBuf::from("logs/site-vitals.log")));
        assert!(args.log_json);
    }

    #[test]
    fn test_rejects_zero_interval_and_concurrency() {
        assert!(Args::try_parse_from(["site-vitals", "start", "--interval", "0"]).is_err());
        assert!(Args::try_parse_from(["site-vitals", "start", "--max-concurrent", "0"]).is_err());
    }

    #[test]
    fn test_rejects_non_numeric_site_id() {
        assert!(Args::try_parse_from(["site-vitals", "check", "example"]).is_err());
    }
}
