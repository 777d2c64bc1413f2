//! Site Vitals 主程序入口
//!
//! 站点可用性监控工具

use anyhow::{Context, Result};
use clap::Parser;
use site_vitals::cli::args::{Args, Commands};
use site_vitals::cli::commands::{
    CheckCommand, Command, InitCommand, StartCommand, ValidateCommand, VersionCommand,
};
use site_vitals::config::{ConfigLoader, TomlConfigLoader};
use site_vitals::logging::{LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = resolve_log_config(&args).await;

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Site Vitals v{} 启动", site_vitals::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 日志配置：命令行参数优先，其次是配置文件，都没有时输出 info 级别到控制台
async fn resolve_log_config(args: &Args) -> LogConfig {
    let loader = TomlConfigLoader::new(true);
    let mut log_config = match loader.load_from_file(args.get_config_path()).await {
        Ok(config) => LogConfig::from_global(&config.global),
        Err(_) => LogConfig::default(),
    };

    if let Some(level) = args.log_level {
        log_config.level = level.into();
    }
    if let Some(file_path) = &args.log_file {
        log_config.file_path = Some(file_path.clone());
    }
    if args.log_json {
        log_config.json_format = true;
    }
    log_config
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Start { .. } => Box::new(StartCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
