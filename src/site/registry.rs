//! 站点注册表
//!
//! 提供站点查询接口和基于内存的实现。新站点注册后会通过
//! 站点新增通道广播，监控端收到后立即执行一次检测。

use super::{normalize_url, Site, SiteId};
use crate::error::RegistryError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// 站点新增通道容量
const SITE_ADDED_CHANNEL_CAPACITY: usize = 256;

/// 站点注册表trait
#[async_trait]
pub trait SiteRegistry: Send + Sync {
    /// 按ID获取站点
    async fn get(&self, id: SiteId) -> Result<Option<Site>, RegistryError>;

    /// 获取所有站点
    async fn list(&self) -> Result<Vec<Site>, RegistryError>;
}

/// 基于内存的站点注册表
pub struct MemorySiteRegistry {
    /// 站点映射，按ID有序
    sites: RwLock<BTreeMap<SiteId, Site>>,
    /// 站点新增事件发送端
    site_added: broadcast::Sender<Site>,
}

impl MemorySiteRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        let (site_added, _) = broadcast::channel(SITE_ADDED_CHANNEL_CAPACITY);
        Self {
            sites: RwLock::new(BTreeMap::new()),
            site_added,
        }
    }

    /// 使用已有站点创建注册表
    ///
    /// 预置站点不会触发站点新增事件。
    pub fn with_sites(sites: Vec<Site>) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for site in sites {
            let id = site.id;
            if map.insert(id, site).is_some() {
                return Err(RegistryError::DuplicateId(id));
            }
        }

        let (site_added, _) = broadcast::channel(SITE_ADDED_CHANNEL_CAPACITY);
        Ok(Self {
            sites: RwLock::new(map),
            site_added,
        })
    }

    /// 订阅站点新增事件
    pub fn subscribe_site_added(&self) -> broadcast::Receiver<Site> {
        self.site_added.subscribe()
    }

    /// 注册新站点
    ///
    /// 分配下一个可用ID，规范化URL后保存，并广播站点新增事件。
    pub async fn add(&self, url: &str) -> Result<Site, RegistryError> {
        let url = normalize_url(url);
        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| RegistryError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RegistryError::InvalidUrl(format!(
                "{url}: 只支持 http/https 协议"
            )));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(RegistryError::InvalidUrl(format!("{url}: 缺少主机名")));
        }

        let site = {
            let mut sites = self.sites.write().await;
            let id = sites.keys().next_back().map_or(1, |last| last + 1);
            let site = Site::new(id, url);
            sites.insert(id, site.clone());
            site
        };

        info!("注册新站点: #{} {}", site.id, site.url);

        // 没有订阅者时发送会失败，此时站点会在下一次巡检时被检测
        if self.site_added.send(site.clone()).is_err() {
            debug!("站点新增事件无订阅者: #{}", site.id);
        }

        Ok(site)
    }
}

impl Default for MemorySiteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SiteRegistry for MemorySiteRegistry {
    async fn get(&self, id: SiteId) -> Result<Option<Site>, RegistryError> {
        Ok(self.sites.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Site>, RegistryError> {
        Ok(self.sites.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_assigns_ids_and_normalizes_url() {
        let registry = MemorySiteRegistry::new();

        let first = registry.add("example.com").await.unwrap();
        let second = registry.add("http://example.org").await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(first.url, "https://example.com");
        assert_eq!(second.id, 2);
        assert_eq!(second.url, "http://example.org");
        assert_eq!(registry.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_add_publishes_site_added_event() {
        let registry = MemorySiteRegistry::new();
        let mut receiver = registry.subscribe_site_added();

        let site = registry.add("example.com").await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, site);
    }

    #[tokio::test]
    async fn test_with_sites_rejects_duplicate_ids() {
        let result = MemorySiteRegistry::with_sites(vec![
            Site::new(1, "https://a.example"),
            Site::new(1, "https://b.example"),
        ]);

        assert!(matches!(result, Err(RegistryError::DuplicateId(1))));
    }

    #[tokio::test]
    async fn test_add_continues_after_seeded_ids() {
        let registry = MemorySiteRegistry::with_sites(vec![Site::new(41, "https://a.example")]).unwrap();

        let site = registry.add("b.example").await.unwrap();
        assert_eq!(site.id, 42);
        assert_eq!(registry.get(41).await.unwrap().unwrap().url, "https://a.example");
        assert!(registry.get(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_rejects_unsupported_scheme() {
        let registry = MemorySiteRegistry::new();

        let result = registry.add("ftp://example.com").await;
        assert!(matches!(result, Err(RegistryError::InvalidUrl(_))));
        assert!(registry.list().await.unwrap().is_empty());
    }
}
