//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑。`build_components` 是唯一的组装入口，
//! 所有协作者在这里创建并以trait对象注入。

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{validate_config, Config, ConfigLoader, TomlConfigLoader};
use crate::error::{Result, SweepError};
use crate::events::{BroadcastPublisher, EventPublisher, FanoutPublisher, WebhookPublisher};
use crate::health::{
    CheckHistory, CheckOutcome, HttpProber, JsonlCheckHistory, MemoryCheckHistory, Monitor,
    MonitorScheduler, Scheduler, Sweeper,
};
use crate::metrics::CheckMetrics;
use crate::notification::{
    FeishuSender, HandlebarsTemplate, NotificationSender, TransitionNotifier,
};
use crate::site::{MemorySiteRegistry, Site};
use crate::web::{AppState, WebServer};
use anyhow::Context;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 运行所需的核心组件
pub struct ServiceComponents {
    /// 站点注册表
    pub registry: Arc<MemorySiteRegistry>,
    /// 状态变化广播
    pub transitions: BroadcastPublisher,
    /// 指标收集器
    pub metrics: Arc<CheckMetrics>,
    /// 站点检测器
    pub monitor: Arc<Monitor>,
    /// 巡检器
    pub sweeper: Arc<Sweeper>,
}

/// 按配置创建核心组件
///
/// 检测历史在配置了 `history_path` 时写入JSONL文件，否则只保存在内存中。
/// 配置了 `transition_webhook_url` 时，状态变化事件同时推送到该地址。
pub async fn build_components(config: &Config) -> anyhow::Result<ServiceComponents> {
    let global = &config.global;

    let sites: Vec<Site> = config.sites.iter().map(Site::from).collect();
    let registry = Arc::new(MemorySiteRegistry::with_sites(sites).context("初始化站点注册表失败")?);

    let history: Arc<dyn CheckHistory> = match &global.history_path {
        Some(path) => Arc::new(
            JsonlCheckHistory::open(path)
                .await
                .with_context(|| format!("打开检测历史文件失败: {}", path.display()))?,
        ),
        None => {
            warn!("未配置 history_path，检测历史只保存在内存中");
            Arc::new(MemoryCheckHistory::new())
        }
    };

    let timeout = Duration::from_secs(global.request_timeout_seconds);
    let transitions = BroadcastPublisher::new();
    let publisher: Arc<dyn EventPublisher> = match &global.transition_webhook_url {
        Some(url) => {
            let webhook = WebhookPublisher::new(url.clone(), timeout)
                .context("创建状态变化webhook发布器失败")?;
            info!("状态变化事件将推送到: {}", url);
            Arc::new(FanoutPublisher::new(vec![
                Arc::new(transitions.clone()),
                Arc::new(webhook),
            ]))
        }
        None => Arc::new(transitions.clone()),
    };

    let prober = Arc::new(HttpProber::new(timeout).context("创建HTTP探测器失败")?);
    let metrics = Arc::new(CheckMetrics::new().context("创建指标收集器失败")?);

    let monitor = Arc::new(
        Monitor::new(
            registry.clone(),
            prober,
            history,
            publisher,
            metrics.clone(),
        )
        .with_serialized_site_checks(global.serialize_site_checks),
    );
    let sweeper = Arc::new(Sweeper::new(monitor.clone(), global.max_concurrent_checks));

    Ok(ServiceComponents {
        registry,
        transitions,
        metrics,
        monitor,
        sweeper,
    })
}

/// 按配置创建飞书通知发送器，未配置webhook时返回 None
pub fn build_notifier(config: &Config) -> anyhow::Result<Option<Arc<dyn NotificationSender>>> {
    let Some(webhook_url) = &config.global.default_feishu_webhook_url else {
        return Ok(None);
    };

    let template = match &config.global.message_template {
        Some(template) => HandlebarsTemplate::new(template).context("消息模板无效")?,
        None => HandlebarsTemplate::default(),
    };

    let sender = FeishuSender::new(
        webhook_url.clone(),
        config.global.feishu_secret.clone(),
        template,
    )?;
    Ok(Some(Arc::new(sender)))
}

/// 加载配置文件
async fn load_config(config_path: &Path) -> anyhow::Result<Config> {
    if !config_path.exists() {
        anyhow::bail!(
            "配置文件不存在: {}\n提示：请运行 'site-vitals init' 创建默认配置文件",
            config_path.display()
        );
    }

    let loader = TomlConfigLoader::new(true);
    let config = loader
        .load_from_file(config_path)
        .await
        .with_context(|| format!("加载配置文件失败: {}", config_path.display()))?;

    info!("配置加载完成，站点数量: {}", config.sites.len());
    Ok(config)
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 配置文件模板
    pub fn config_template() -> &'static str {
        include_str!("../../config.example.toml")
    }

    /// 创建配置文件
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, Self::config_template()).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加需要监控的站点");

        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { config_path } = &args.command {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());
            self.validate_config_file(&config_file, args.is_verbose())
                .await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        println!("✓ 配置文件验证通过");
        println!("✓ 找到 {} 个站点配置", config.sites.len());

        if verbose {
            let global = &config.global;
            println!("全局配置:");
            println!("  巡检间隔: {}秒", global.check_interval_seconds);
            println!("  请求超时: {}秒", global.request_timeout_seconds);
            println!("  最大并发: {}", global.max_concurrent_checks);
            println!("  日志级别: {}", global.log_level);
            println!(
                "  检测历史: {}",
                global
                    .history_path
                    .as_ref()
                    .map_or("内存".to_string(), |p| p.display().to_string())
            );
            println!("站点配置:");
            for site in &config.sites {
                println!("  #{} {}", site.id, site.url);
            }
        }

        Ok(())
    }
}

/// 一次性检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { site, format } = &args.command {
            let config = load_config(&args.get_config_path()).await?;
            let components = build_components(&config).await?;

            match site {
                Some(site_id) => {
                    let outcome = components.monitor.check_one(*site_id).await?;
                    self.print_outcome(&outcome, *format)?;
                }
                None => self.check_all(&components, *format).await?,
            }
        }
        Ok(())
    }
}

impl CheckCommand {
    async fn check_all(&self, components: &ServiceComponents, format: OutputFormat) -> Result<()> {
        println!("开始检测所有站点...");

        match components.sweeper.sweep_all(&CancellationToken::new()).await {
            Ok(report) => {
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                    OutputFormat::Text => {
                        println!(
                            "✓ 检测完成: {} 个站点, {} 个不可达, {} 个状态变化",
                            report.checked, report.down, report.transitions
                        );
                    }
                }
                Ok(())
            }
            Err(err @ SweepError::Partial { .. }) => {
                for site_id in err.failed_site_ids() {
                    eprintln!("✗ 站点 #{site_id} 检测失败");
                }
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn print_outcome(&self, outcome: &CheckOutcome, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
            OutputFormat::Text => {
                let status_icon = if outcome.record.up { "✓" } else { "✗" };
                println!(
                    "{} #{} ({}) - {} - {}ms",
                    status_icon,
                    outcome.site.id,
                    outcome.site.url,
                    if outcome.record.up { "正常" } else { "不可达" },
                    outcome.response_time_ms
                );
                if let Some(error) = &outcome.error_message {
                    println!("  错误: {error}");
                }
                if let Some(transition) = &outcome.transition {
                    println!("  状态变化: {transition}");
                }
            }
        }
        Ok(())
    }
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Start {
            interval,
            max_concurrent,
        } = &args.command
        {
            let config = load_config(&args.get_config_path()).await?;
            let config = apply_start_overrides(config, *interval, *max_concurrent)?;

            self.run_service(config).await?;
        }
        Ok(())
    }
}

/// 命令行参数覆盖配置文件，覆盖后重新验证
pub fn apply_start_overrides(
    mut config: Config,
    interval: Option<u64>,
    max_concurrent: Option<usize>,
) -> anyhow::Result<Config> {
    if let Some(interval_secs) = interval {
        config.global.check_interval_seconds = interval_secs;
    }
    if let Some(max_concurrent_checks) = max_concurrent {
        config.global.max_concurrent_checks = max_concurrent_checks;
    }

    validate_config(&config).map_err(|e| anyhow::anyhow!("命令行参数无效: {e}"))?;
    Ok(config)
}

impl StartCommand {
    /// 服务主逻辑
    async fn run_service(&self, config: Config) -> anyhow::Result<()> {
        info!("启动站点监控服务...");

        let components = build_components(&config).await?;

        let scheduler = MonitorScheduler::new(
            components.sweeper.clone(),
            Duration::from_secs(config.global.check_interval_seconds),
        )
        .with_site_added(components.registry.subscribe_site_added());
        let shutdown = scheduler.shutdown_token();

        let notifier_handle = match build_notifier(&config)? {
            Some(sender) => {
                info!("飞书状态变化通知已启用");
                Some(
                    TransitionNotifier::new(sender)
                        .spawn(components.transitions.subscribe(), shutdown.clone()),
                )
            }
            None => None,
        };

        let web_handle = match config.global.web.clone() {
            Some(web_config) if web_config.enabled => {
                let state = AppState::new(
                    components.sweeper.clone(),
                    components.registry.clone(),
                    shutdown.clone(),
                );
                let server = WebServer::new(web_config, state);
                Some(tokio::spawn(async move {
                    if let Err(e) = server.start().await {
                        error!("Web 服务器运行失败: {:#}", e);
                    }
                }))
            }
            _ => {
                info!("Web API 未启用");
                None
            }
        };

        scheduler.start().await.context("启动监控调度器失败")?;
        info!(
            "站点监控服务已启动，共 {} 个站点",
            config.sites.len()
        );

        match signal::ctrl_c().await {
            Ok(()) => info!("收到中断信号，正在停止服务..."),
            Err(err) => error!("监听中断信号失败: {}", err),
        }

        // 取消后不再发起新的检测，已开始的检测会正常结束
        scheduler.stop().await.context("停止监控调度器失败")?;

        for handle in [notifier_handle, web_handle].into_iter().flatten() {
            if let Err(e) = handle.await {
                error!("后台任务异常退出: {}", e);
            }
        }

        let status = scheduler.get_status().await;
        info!(
            "服务已停止，共完成 {} 次巡检",
            status.sweeps_completed
        );
        Ok(())
    }
}
