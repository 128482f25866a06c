//! 对等实例与服务发现
//!
//! 定义网络检测器消费的发现接口、实例数据模型、标签选择器以及
//! 基于配置清单的静态实现。

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// 实例运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeerPhase {
    /// 等待调度或启动中
    Pending,
    /// 运行中
    #[default]
    Running,
    /// 已成功退出
    Succeeded,
    /// 已失败
    Failed,
    /// 状态未知
    Unknown,
}

/// 候选对等实例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInstance {
    /// 实例名称
    pub name: String,
    /// 所在命名空间
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// 所在节点
    pub node_name: String,
    /// 运行阶段
    #[serde(default)]
    pub phase: PeerPhase,
    /// 是否就绪
    #[serde(default)]
    pub ready: bool,
    /// 网络地址
    #[serde(default)]
    pub address: Option<IpAddr>,
    /// 标签
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// 服务条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// 服务名称
    pub name: String,
    /// 所在命名空间
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// 服务地址
    pub address: IpAddr,
}

fn default_namespace() -> String {
    "default".to_string()
}

/// 通过过滤的对等实例
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligiblePeer {
    /// 实例名称
    pub name: String,
    /// 网络地址
    pub address: IpAddr,
}

/// 对等实例与服务发现接口
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    /// 按标签选择器列出命名空间内的候选实例
    async fn list_peers(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PeerInstance>, DiscoveryError>;

    /// 获取命名空间内指定服务的地址
    async fn service_address(&self, namespace: &str, name: &str)
        -> Result<IpAddr, DiscoveryError>;
}

/// 等值标签选择器，格式为 `k=v[,k=v...]`，空串匹配全部
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector {
    requirements: Vec<(String, String)>,
}

impl LabelSelector {
    /// 解析标签选择器
    pub fn parse(selector: &str) -> Result<Self, DiscoveryError> {
        let mut requirements = Vec::new();
        for term in selector.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = term
                .split_once('=')
                .ok_or_else(|| DiscoveryError::InvalidSelector(selector.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(DiscoveryError::InvalidSelector(selector.to_string()));
            }
            requirements.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self { requirements })
    }

    /// 标签集合是否满足选择器
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

/// 过滤出可参与探测的实例
///
/// 排除非运行中、未就绪、没有地址以及位于排除节点上的实例。
pub fn eligible_peers(peers: &[PeerInstance], excluded_nodes: &[String]) -> Vec<EligiblePeer> {
    peers
        .iter()
        .filter(|peer| peer.phase == PeerPhase::Running)
        .filter(|peer| peer.ready)
        .filter(|peer| !excluded_nodes.iter().any(|node| node == &peer.node_name))
        .filter_map(|peer| {
            peer.address.map(|address| EligiblePeer {
                name: peer.name.clone(),
                address,
            })
        })
        .collect()
}

/// 基于配置清单的静态发现实现
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    peers: Vec<PeerInstance>,
    services: Vec<ServiceEntry>,
}

impl StaticDiscovery {
    /// 创建静态发现
    pub fn new(peers: Vec<PeerInstance>, services: Vec<ServiceEntry>) -> Self {
        Self { peers, services }
    }
}

impl From<DiscoveryConfig> for StaticDiscovery {
    fn from(config: DiscoveryConfig) -> Self {
        Self::new(config.peers, config.services)
    }
}

#[async_trait]
impl PeerDiscovery for StaticDiscovery {
    async fn list_peers(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PeerInstance>, DiscoveryError> {
        let selector = LabelSelector::parse(selector)?;
        Ok(self
            .peers
            .iter()
            .filter(|peer| peer.namespace == namespace && selector.matches(&peer.labels))
            .cloned()
            .collect())
    }

    async fn service_address(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<IpAddr, DiscoveryError> {
        self.services
            .iter()
            .find(|service| service.namespace == namespace && service.name == name)
            .map(|service| service.address)
            .ok_or_else(|| DiscoveryError::ServiceNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
