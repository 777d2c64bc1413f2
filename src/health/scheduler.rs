//! 任务调度器模块
//!
//! 两个触发入口：按固定间隔执行全站巡检，以及收到站点新增事件后
//! 立即检测新站点。两者最终都调用 `Monitor::check_one` 的同一条路径。

use crate::health::sweeper::Sweeper;
use crate::site::Site;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 默认巡检间隔（5分钟）
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// 调度器状态
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    /// 调度器是否运行中
    pub is_running: bool,
    /// 已完成的巡检次数
    pub sweeps_completed: u64,
    /// 最近一次巡检完成时间
    pub last_sweep_at: Option<DateTime<Utc>>,
    /// 最近一次巡检失败的站点数
    pub last_sweep_failures: usize,
    /// 由站点新增事件触发的检测次数
    pub site_added_checks: u64,
}

/// 任务调度器trait
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 启动调度器
    async fn start(&self) -> Result<()>;

    /// 停止调度器
    ///
    /// 不再发起新的检测，正在进行的检测会正常结束。
    async fn stop(&self) -> Result<()>;

    /// 获取调度器状态
    async fn get_status(&self) -> SchedulerStatus;
}

/// 监控调度器
pub struct MonitorScheduler {
    /// 巡检器
    sweeper: Arc<Sweeper>,
    /// 巡检间隔
    interval: Duration,
    /// 站点新增事件接收器，启动时取出
    site_added: Mutex<Option<broadcast::Receiver<Site>>>,
    /// 关闭信号
    shutdown: CancellationToken,
    /// 运行中的任务
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// 调度器状态
    status: Arc<RwLock<SchedulerStatus>>,
}

impl MonitorScheduler {
    /// 创建新的监控调度器
    ///
    /// # 参数
    /// * `sweeper` - 巡检器
    /// * `interval` - 巡检间隔
    pub fn new(sweeper: Arc<Sweeper>, interval: Duration) -> Self {
        Self {
            sweeper,
            interval,
            site_added: Mutex::new(None),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
        }
    }

    /// 监听站点新增事件
    pub fn with_site_added(self, receiver: broadcast::Receiver<Site>) -> Self {
        Self {
            site_added: Mutex::new(Some(receiver)),
            ..self
        }
    }

    /// 关闭信号，可用于外部取消
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn spawn_sweep_loop(&self) -> JoinHandle<()> {
        let sweeper = Arc::clone(&self.sweeper);
        let status = Arc::clone(&self.status);
        let shutdown = self.shutdown.clone();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("启动定时巡检，间隔: {}秒", period.as_secs());

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // 巡检在本任务内顺序执行，不会重叠
                let failures = match sweeper.sweep_all(&shutdown).await {
                    Ok(_) => 0,
                    Err(e) => {
                        error!("巡检失败: {}", e);
                        e.failed_site_ids().len()
                    }
                };

                let mut status = status.write().await;
                status.sweeps_completed += 1;
                status.last_sweep_at = Some(Utc::now());
                status.last_sweep_failures = failures;
            }

            info!("定时巡检已停止");
        })
    }

    fn spawn_site_added_listener(&self, mut receiver: broadcast::Receiver<Site>) -> JoinHandle<()> {
        let monitor = Arc::clone(self.sweeper.monitor());
        let status = Arc::clone(&self.status);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            info!("站点新增监听器已启动");
            loop {
                let site = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(site) => site,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("站点新增事件积压，丢失 {} 条，相关站点将在下次巡检时检测", skipped);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };

                debug!("收到站点新增事件: #{} {}", site.id, site.url);
                if let Err(e) = monitor.check_one(site.id).await {
                    error!("新站点检测失败: #{} - {}", site.id, e);
                }
                status.write().await.site_added_checks += 1;
            }
            info!("站点新增监听器已停止");
        })
    }
}

#[async_trait]
impl Scheduler for MonitorScheduler {
    async fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            anyhow::bail!("调度器已在运行");
        }
        if self.interval.is_zero() {
            anyhow::bail!("巡检间隔必须大于0");
        }

        info!("启动监控调度器");
        tasks.push(self.spawn_sweep_loop());

        if let Some(receiver) = self.site_added.lock().await.take() {
            tasks.push(self.spawn_site_added_listener(receiver));
        }

        self.status.write().await.is_running = true;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("停止监控调度器");
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("调度任务异常退出: {}", e);
            }
        }

        self.status.write().await.is_running = false;
        info!("监控调度器已停止");
        Ok(())
    }

    async fn get_status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }
}
