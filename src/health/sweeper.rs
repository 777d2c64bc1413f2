//! 全站巡检
//!
//! 对所有站点执行一次检测，并发数受信号量限制。单个站点失败不会中止
//! 其他站点，所有任务结束后汇总失败列表。

use crate::error::{CheckError, SiteFailure, SweepError};
use crate::health::monitor::{CheckOutcome, Monitor};
use crate::site::SiteId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// 默认最大并发检测数
pub const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 8;

/// 巡检报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 站点总数
    pub total: usize,
    /// 已执行检测的站点数
    pub checked: usize,
    /// 检测成功的站点数
    pub succeeded: usize,
    /// 本次检测中不可达的站点数
    pub down: usize,
    /// 本次产生的状态变化数
    pub transitions: usize,
    /// 因取消而未执行的站点数
    pub skipped: usize,
    /// 巡检是否被取消
    pub cancelled: bool,
}

/// 巡检器
pub struct Sweeper {
    monitor: Arc<Monitor>,
    max_concurrent: usize,
}

impl Sweeper {
    /// 创建新的巡检器
    ///
    /// # 参数
    /// * `monitor` - 站点检测器
    /// * `max_concurrent` - 最大并发检测数，0 按 1 处理
    pub fn new(monitor: Arc<Monitor>, max_concurrent: usize) -> Self {
        Self {
            monitor,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 站点检测器
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// 最大并发检测数
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 检测所有站点
    ///
    /// 取消后不再启动新的检测，已经开始的检测会正常结束。
    pub async fn sweep_all(&self, cancel: &CancellationToken) -> Result<SweepReport, SweepError> {
        let sweep_id = Uuid::new_v4();
        let span = info_span!("sweep", id = %sweep_id);
        self.run_sweep(cancel).instrument(span).await
    }

    async fn run_sweep(&self, cancel: &CancellationToken) -> Result<SweepReport, SweepError> {
        let sites = self.monitor.registry().list().await?;
        let mut report = SweepReport {
            total: sites.len(),
            ..Default::default()
        };

        info!(
            "开始巡检，站点数量: {}，最大并发: {}",
            sites.len(),
            self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks: JoinSet<Result<CheckOutcome, CheckError>> = JoinSet::new();
        let mut task_sites: HashMap<tokio::task::Id, SiteId> = HashMap::new();

        for site in sites {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        // 信号量只在本函数内持有，不会被关闭
                        report.cancelled = true;
                        break;
                    }
                },
            };

            let monitor = Arc::clone(&self.monitor);
            let site_id = site.id;
            let handle = tasks.spawn(
                async move {
                    let result = monitor.check_site(&site).await;
                    drop(permit);
                    result
                }
                .in_current_span(),
            );
            task_sites.insert(handle.id(), site_id);
            report.checked += 1;
        }

        report.skipped = report.total - report.checked;

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    report.succeeded += 1;
                    if !outcome.record.up {
                        report.down += 1;
                    }
                    if outcome.transition.is_some() {
                        report.transitions += 1;
                    }
                }
                Ok((task_id, Err(error))) => {
                    if let Some(site_id) = task_sites.remove(&task_id) {
                        failures.push(SiteFailure { site_id, error });
                    }
                }
                Err(e) => {
                    let Some(site_id) = task_sites.remove(&e.id()) else {
                        error!("未知检测任务异常退出: {}", e);
                        continue;
                    };
                    error!("站点 #{} 检测任务异常退出: {}", site_id, e);
                    failures.push(SiteFailure {
                        site_id,
                        error: CheckError::Aborted(e.to_string()),
                    });
                }
            }
        }

        self.monitor.metrics().record_sweep();

        if report.cancelled {
            warn!("巡检已取消，跳过 {} 个站点", report.skipped);
        }

        if failures.is_empty() {
            info!(
                "巡检完成: 检测 {}，不可达 {}，状态变化 {}",
                report.checked, report.down, report.transitions
            );
            Ok(report)
        } else {
            failures.sort_by_key(|f| f.site_id);
            warn!(
                "巡检完成，{} 个站点检测失败，成功 {}",
                failures.len(),
                report.succeeded
            );
            Err(SweepError::Partial {
                checked: report.checked,
                failures,
            })
        }
    }
}
