//! 聚合状态存储模块
//!
//! 定义按节点持久化的聚合检测状态及其存储接口，并提供基于 JSON 文件
//! 与基于内存的两种实现。

use crate::config::validate_node_name;
use crate::error::PersistError;
use crate::health::result::{CheckResult, ResultSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// 按节点持久化的聚合状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStatus {
    /// 被检测节点
    pub node_ref: String,
    /// 检测器名称到最近一次结果的映射
    #[serde(default)]
    pub results: BTreeMap<String, ResultSnapshot>,
    /// 最后更新时间
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AggregatedStatus {
    /// 创建空状态
    pub fn new(node_ref: impl Into<String>) -> Self {
        Self {
            node_ref: node_ref.into(),
            results: BTreeMap::new(),
            updated_at: None,
        }
    }

    /// 合并一组检测结果
    ///
    /// 同名条目被替换，不会追加重复条目。
    pub fn merge<'a, I>(&mut self, results: I)
    where
        I: IntoIterator<Item = (&'a String, &'a CheckResult)>,
    {
        for (name, result) in results {
            self.results.insert(name.clone(), result.snapshot());
        }
        self.updated_at = Some(Utc::now());
    }

    /// 查询某个检测器的最近结果
    pub fn result(&self, name: &str) -> Option<&ResultSnapshot> {
        self.results.get(name)
    }
}

/// 状态存储接口
///
/// 不提供超出具体实现本身的事务保证；调用方按"读取-修改-写回"使用。
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// 读取指定节点的聚合状态
    async fn get(&self, key: &str) -> Result<AggregatedStatus, PersistError>;

    /// 写回聚合状态（以 `node_ref` 为键）
    async fn update(&self, status: AggregatedStatus) -> Result<(), PersistError>;
}

/// 基于 JSON 文件的状态存储，每个节点一个文件
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    dir: PathBuf,
}

impl FileStatusStore {
    /// 创建文件状态存储
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 节点状态文件路径
    ///
    /// 键必须是合法的节点名称，不能指向状态目录以外。
    pub fn path_for(&self, key: &str) -> Result<PathBuf, String> {
        validate_node_name(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    async fn write_atomically(path: &Path, json_data: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json_data).await?;
        tokio::fs::rename(&tmp_path, path).await
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn get(&self, key: &str) -> Result<AggregatedStatus, PersistError> {
        let path = self.path_for(key).map_err(|reason| PersistError::Read {
            key: key.to_string(),
            reason,
        })?;
        let json_data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            // 文件尚不存在时视为空状态，首次写入时创建
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("状态文件不存在，使用空状态: {}", path.display());
                return Ok(AggregatedStatus::new(key));
            }
            Err(e) => {
                return Err(PersistError::Read {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_str(&json_data).map_err(|e| PersistError::Read {
            key: key.to_string(),
            reason: format!("解析状态文件失败: {e}"),
        })
    }

    async fn update(&self, status: AggregatedStatus) -> Result<(), PersistError> {
        let key = status.node_ref.clone();
        let json_data = serde_json::to_string_pretty(&status).map_err(|e| PersistError::Write {
            key: key.clone(),
            reason: format!("序列化状态失败: {e}"),
        })?;

        let path = match self.path_for(&key) {
            Ok(path) => path,
            Err(reason) => return Err(PersistError::Write { key, reason }),
        };
        Self::write_atomically(&path, &json_data)
            .await
            .map_err(|e| PersistError::Write {
                key,
                reason: e.to_string(),
            })?;

        debug!("状态已写入: {}", path.display());
        Ok(())
    }
}

/// 基于内存的状态存储
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    statuses: RwLock<HashMap<String, AggregatedStatus>>,
}

impl MemoryStatusStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个节点状态
    pub async fn seed(&self, status: AggregatedStatus) {
        let mut statuses = self.statuses.write().await;
        statuses.insert(status.node_ref.clone(), status);
    }

    /// 读取当前保存的状态（不存在时返回 None）
    pub async fn current(&self, key: &str) -> Option<AggregatedStatus> {
        self.statuses.read().await.get(key).cloned()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get(&self, key: &str) -> Result<AggregatedStatus, PersistError> {
        Ok(self
            .current(key)
            .await
            .unwrap_or_else(|| AggregatedStatus::new(key)))
    }

    async fn update(&self, status: AggregatedStatus) -> Result<(), PersistError> {
        self.seed(status).await;
        Ok(())
    }
}
