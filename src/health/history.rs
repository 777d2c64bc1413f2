//! 检测历史存储
//!
//! 只追加的 `(site_id, up, checked_at)` 记录。同一站点的 `checked_at`
//! 按写入顺序严格递增：时间戳不晚于最新记录的新记录会被顺延 1 微秒后写入。

use crate::error::HistoryError;
use crate::site::SiteId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// 检测记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    /// 站点ID
    pub site_id: SiteId,
    /// 是否可达
    pub up: bool,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
}

impl CheckRecord {
    /// 以当前时间创建检测记录
    pub fn new(site_id: SiteId, up: bool) -> Self {
        Self {
            site_id,
            up,
            checked_at: Utc::now(),
        }
    }

    /// 保证时间戳晚于上一条记录
    fn ordered_after(mut self, last: Option<&CheckRecord>) -> Self {
        if let Some(last) = last {
            if self.checked_at <= last.checked_at {
                self.checked_at = last.checked_at + Duration::microseconds(1);
            }
        }
        self
    }
}

/// 检测历史trait
#[async_trait]
pub trait CheckHistory: Send + Sync {
    /// 站点最近一条记录
    async fn last(&self, site_id: SiteId) -> Result<Option<CheckRecord>, HistoryError>;

    /// 追加一条记录，返回实际写入的记录
    async fn append(&self, record: CheckRecord) -> Result<CheckRecord, HistoryError>;

    /// 站点最近的若干条记录，按时间倒序
    async fn recent(&self, site_id: SiteId, limit: usize)
        -> Result<Vec<CheckRecord>, HistoryError>;
}

/// 基于内存的检测历史
#[derive(Debug, Default)]
pub struct MemoryCheckHistory {
    records: RwLock<HashMap<SiteId, Vec<CheckRecord>>>,
}

impl MemoryCheckHistory {
    /// 创建空的检测历史
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录总数
    pub async fn len(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }

    /// 是否没有任何记录
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 站点的全部记录，按写入顺序
    pub async fn records_for(&self, site_id: SiteId) -> Vec<CheckRecord> {
        self.records
            .read()
            .await
            .get(&site_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CheckHistory for MemoryCheckHistory {
    async fn last(&self, site_id: SiteId) -> Result<Option<CheckRecord>, HistoryError> {
        Ok(self
            .records
            .read()
            .await
            .get(&site_id)
            .and_then(|records| records.last().cloned()))
    }

    async fn append(&self, record: CheckRecord) -> Result<CheckRecord, HistoryError> {
        let mut records = self.records.write().await;
        let site_records = records.entry(record.site_id).or_default();
        let record = record.ordered_after(site_records.last());
        site_records.push(record.clone());
        Ok(record)
    }

    async fn recent(
        &self,
        site_id: SiteId,
        limit: usize,
    ) -> Result<Vec<CheckRecord>, HistoryError> {
        Ok(self
            .records
            .read()
            .await
            .get(&site_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// 可写部分：文件句柄、已提交长度与每个站点的最新记录
struct JsonlState {
    file: File,
    len: u64,
    latest: HashMap<SiteId, CheckRecord>,
}

/// 基于JSONL文件的检测历史
///
/// 每行一条JSON记录，只追加不修改。打开时扫描文件重建每个站点的最新记录索引。
pub struct JsonlCheckHistory {
    path: PathBuf,
    state: Mutex<JsonlState>,
}

impl JsonlCheckHistory {
    /// 打开（或创建）历史文件
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        // 末尾没有换行的是写了一半的记录，丢弃
        let committed = Self::committed_len(&content);
        let latest = Self::index_latest(&content[..committed])?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if committed < content.len() {
            warn!(
                "检测历史文件末尾存在不完整记录，已截断 {} 字节: {}",
                content.len() - committed,
                path.display()
            );
            file.set_len(committed as u64).await?;
        }

        info!(
            "打开检测历史文件: {} (已有 {} 个站点)",
            path.display(),
            latest.len()
        );

        Ok(Self {
            path,
            state: Mutex::new(JsonlState {
                file,
                len: committed as u64,
                latest,
            }),
        })
    }

    /// 历史文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 最后一个换行符之后的内容不计入
    fn committed_len(content: &str) -> usize {
        content.rfind('\n').map_or(0, |pos| pos + 1)
    }

    fn index_latest(content: &str) -> Result<HashMap<SiteId, CheckRecord>, HistoryError> {
        let mut latest: HashMap<SiteId, CheckRecord> = HashMap::new();
        for record in Self::parse_lines(content)? {
            match latest.get(&record.site_id) {
                Some(existing) if existing.checked_at >= record.checked_at => {}
                _ => {
                    latest.insert(record.site_id, record);
                }
            }
        }
        Ok(latest)
    }

    fn parse_lines(content: &str) -> Result<Vec<CheckRecord>, HistoryError> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| HistoryError::Corrupted {
                    line: index + 1,
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

impl JsonlCheckHistory {
    async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
        file.write_all(line).await?;
        file.flush().await?;
        file.sync_data().await
    }

    /// 回滚到最后一次成功写入的长度，避免下一条记录接在残缺行后面
    async fn rollback(state: &mut JsonlState) {
        if let Err(e) = state.file.set_len(state.len).await {
            warn!("回滚检测历史文件失败: {}", e);
        }
    }
}

#[async_trait]
impl CheckHistory for JsonlCheckHistory {
    async fn last(&self, site_id: SiteId) -> Result<Option<CheckRecord>, HistoryError> {
        Ok(self.state.lock().await.latest.get(&site_id).cloned())
    }

    async fn append(&self, record: CheckRecord) -> Result<CheckRecord, HistoryError> {
        let mut state = self.state.lock().await;
        let site_id = record.site_id;
        let record = record.ordered_after(state.latest.get(&site_id));

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        if let Err(e) = Self::write_line(&mut state.file, &line).await {
            Self::rollback(&mut state).await;
            return Err(e.into());
        }

        debug!("写入检测记录: #{} up={}", site_id, record.up);
        state.len += line.len() as u64;
        state.latest.insert(site_id, record.clone());
        Ok(record)
    }

    async fn recent(
        &self,
        site_id: SiteId,
        limit: usize,
    ) -> Result<Vec<CheckRecord>, HistoryError> {
        // 持有锁读取，避免读到写了一半的行
        let _state = self.state.lock().await;
        let content = tokio::fs::read_to_string(&self.path).await?;
        let committed = Self::committed_len(&content);

        let mut records: Vec<CheckRecord> = Self::parse_lines(&content[..committed])?
            .into_iter()
            .filter(|record| record.site_id == site_id)
            .collect();
        records.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        records.truncate(limit);
        Ok(records)
    }
}
