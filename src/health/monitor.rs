//! 单站点检测
//!
//! `Monitor::check_one` 是唯一的检测路径：定时巡检、站点新增事件、
//! API和命令行的一次性检测都经过这里，状态变化判定不会被跳过。
//!
//! 顺序：探测 → 读取上一次状态 → 判定 → 发布事件（如有变化）→ 写入记录。
//! 发布失败时不写入记录，保证不会出现没有尝试发布过事件的状态记录。

use crate::error::CheckError;
use crate::events::{EventPublisher, TransitionEvent};
use crate::health::history::{CheckHistory, CheckRecord};
use crate::health::prober::{PingResult, Prober};
use crate::health::transition::{self, Transition};
use crate::metrics::CheckMetrics;
use crate::site::{Site, SiteId, SiteRegistry};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 单站点检测结果
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    /// 站点
    pub site: Site,
    /// 写入的检测记录
    pub record: CheckRecord,
    /// 发生的状态变化
    pub transition: Option<Transition>,
    /// HTTP状态码
    pub status_code: Option<u16>,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
    /// 宕机原因
    pub error_message: Option<String>,
}

/// 站点检测器
pub struct Monitor {
    registry: Arc<dyn SiteRegistry>,
    prober: Arc<dyn Prober>,
    history: Arc<dyn CheckHistory>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<CheckMetrics>,
    /// 每个站点的临界区，未启用串行化时为 None
    site_locks: Option<Mutex<HashMap<SiteId, Arc<Mutex<()>>>>>,
}

impl Monitor {
    /// 创建新的站点检测器
    pub fn new(
        registry: Arc<dyn SiteRegistry>,
        prober: Arc<dyn Prober>,
        history: Arc<dyn CheckHistory>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<CheckMetrics>,
    ) -> Self {
        Self {
            registry,
            prober,
            history,
            publisher,
            metrics,
            site_locks: None,
        }
    }

    /// 同一站点的检测串行执行
    ///
    /// 开启后"读取上一次状态 → 判定 → 发布 → 写入"在站点级临界区内完成，
    /// 并发检测同一站点不会产生重复事件。
    pub fn with_serialized_site_checks(mut self, enabled: bool) -> Self {
        self.site_locks = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    /// 站点注册表
    pub fn registry(&self) -> &Arc<dyn SiteRegistry> {
        &self.registry
    }

    /// 检测历史
    pub fn history(&self) -> &Arc<dyn CheckHistory> {
        &self.history
    }

    /// 指标收集器
    pub fn metrics(&self) -> &Arc<CheckMetrics> {
        &self.metrics
    }

    /// 按ID检测单个站点
    pub async fn check_one(&self, site_id: SiteId) -> Result<CheckOutcome, CheckError> {
        let site = self
            .registry
            .get(site_id)
            .await?
            .ok_or(CheckError::SiteNotFound(site_id))?;

        self.check_site(&site).await
    }

    /// 检测已知站点
    pub async fn check_site(&self, site: &Site) -> Result<CheckOutcome, CheckError> {
        let result = self.run_check(site).await;
        self.metrics.record_check(result.is_ok());

        if let Err(ref e) = result {
            warn!("站点检测失败: #{} {} - {}", site.id, site.url, e);
        }
        result
    }

    async fn run_check(&self, site: &Site) -> Result<CheckOutcome, CheckError> {
        debug!("开始检测站点: #{} {}", site.id, site.url);

        let ping = self.prober.ping(&site.url).await?;
        self.metrics
            .observe_probe(ping.up, ping.response_time.as_secs_f64());

        match self.site_lock(site.id).await {
            Some(lock) => {
                let _guard = lock.lock().await;
                self.record_observation(site, ping).await
            }
            None => self.record_observation(site, ping).await,
        }
    }

    async fn record_observation(
        &self,
        site: &Site,
        ping: PingResult,
    ) -> Result<CheckOutcome, CheckError> {
        let last = self.history.last(site.id).await?;
        let prior_up = transition::prior_up(last.as_ref());
        let transition = transition::evaluate(prior_up, ping.up);

        if let Some(transition) = transition {
            let event = TransitionEvent::new(site.clone(), transition.up());
            self.publisher.publish(&event).await?;
            self.metrics.record_transition(event.up);
            info!(
                "站点状态变化: #{} {} {}",
                site.id, site.url, transition
            );
        }

        let record = self
            .history
            .append(CheckRecord::new(site.id, ping.up))
            .await?;

        if ping.up {
            debug!("站点检测正常: #{} {}", site.id, site.url);
        } else {
            warn!(
                "站点不可达: #{} {} - {}",
                site.id,
                site.url,
                ping.error_message.as_deref().unwrap_or("N/A")
            );
        }

        Ok(CheckOutcome {
            site: site.clone(),
            record,
            transition,
            status_code: ping.status_code,
            response_time_ms: ping.response_time.as_millis() as u64,
            error_message: ping.error_message,
        })
    }

    async fn site_lock(&self, site_id: SiteId) -> Option<Arc<Mutex<()>>> {
        let locks = self.site_locks.as_ref()?;
        let mut locks = locks.lock().await;
        Some(Arc::clone(locks.entry(site_id).or_default()))
    }
}
