//! 网络连通性检测器
//!
//! 从发现接口获取对等实例，逐个探测其可达性，同时探测聚合服务地址，
//! 最后由判定函数给出结论。

pub mod discovery;
pub mod evaluator;
pub mod prober;

pub use discovery::{
    eligible_peers, EligiblePeer, LabelSelector, PeerDiscovery, PeerInstance, PeerPhase,
    ServiceEntry, StaticDiscovery,
};
pub use evaluator::{
    evaluate, ConnectivitySignals, CODE_AGGREGATE_LINK_FAILURE, CODE_COMPLETE_FAILURE,
    CODE_INSUFFICIENT_PEERS, CODE_PEER_CONNECTIVITY_FAILURE,
};
pub use prober::{prober_for, DnsProber, HttpProber, ReachabilityProber};

use crate::config::{CheckerConfig, NetworkCheckerSpec};
use crate::error::CheckError;
use crate::health::checker::Checker;
use crate::health::result::CheckResult;
use async_trait::async_trait;
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// 网络连通性检测器
pub struct NetworkChecker {
    name: String,
    spec: NetworkCheckerSpec,
    excluded_nodes: Vec<String>,
    discovery: Arc<dyn PeerDiscovery>,
    prober: Arc<dyn ReachabilityProber>,
}

impl NetworkChecker {
    /// 创建网络检测器
    ///
    /// # 参数
    /// * `name` - 检测器名称
    /// * `spec` - 网络检测参数
    /// * `node_name` - 被检测节点，位于该节点上的实例不参与探测
    /// * `discovery` - 发现接口
    /// * `prober` - 可达性探测器
    pub fn new(
        name: impl Into<String>,
        spec: NetworkCheckerSpec,
        node_name: &str,
        discovery: Arc<dyn PeerDiscovery>,
        prober: Arc<dyn ReachabilityProber>,
    ) -> Self {
        let mut excluded_nodes = spec.excluded_nodes.clone();
        if !excluded_nodes.iter().any(|node| node == node_name) {
            excluded_nodes.push(node_name.to_string());
        }

        Self {
            name: name.into(),
            spec,
            excluded_nodes,
            discovery,
            prober,
        }
    }

    /// 根据检测器配置创建，探测器按协议选择
    pub fn from_config(
        config: &CheckerConfig,
        node_name: &str,
        discovery: Arc<dyn PeerDiscovery>,
    ) -> anyhow::Result<Self> {
        let spec = config
            .network
            .clone()
            .ok_or_else(|| anyhow::anyhow!("检测器 {} 缺少 [network] 参数", config.name))?;
        let prober = prober_for(&spec)?;
        Ok(Self::new(config.name.clone(), spec, node_name, discovery, prober))
    }

    /// 被排除的节点
    pub fn excluded_nodes(&self) -> &[String] {
        &self.excluded_nodes
    }

    /// 收集一次检测的连通性信号
    async fn collect_signals(&self) -> Result<ConnectivitySignals, CheckError> {
        let peers = self
            .discovery
            .list_peers(&self.spec.namespace, &self.spec.peer_selector)
            .await?;
        let eligible = eligible_peers(&peers, &self.excluded_nodes);
        debug!(
            "检测器 {}: 发现 {} 个实例，其中 {} 个可用",
            self.name,
            peers.len(),
            eligible.len()
        );

        if eligible.len() <= 1 {
            return Ok(ConnectivitySignals::insufficient(eligible.len()));
        }

        let service_address = self
            .discovery
            .service_address(&self.spec.namespace, &self.spec.service_name)
            .await?;

        let port = self.spec.port;
        let peer_probes = join_all(
            eligible
                .iter()
                .map(|peer| self.prober.probe(SocketAddr::new(peer.address, port))),
        );
        let aggregate_probe = self.prober.probe(SocketAddr::new(service_address, port));
        let (peer_outcomes, aggregate_outcome) = tokio::join!(peer_probes, aggregate_probe);

        let mut peer_success_count = 0;
        for (peer, outcome) in eligible.iter().zip(&peer_outcomes) {
            match outcome {
                Ok(()) => peer_success_count += 1,
                Err(e) => debug!("实例 {} ({}) 不可达: {}", peer.name, peer.address, e),
            }
        }

        Ok(ConnectivitySignals {
            peer_count: eligible.len(),
            peer_success_count,
            aggregate_ok: aggregate_outcome.is_ok(),
            aggregate_error: aggregate_outcome.err().map(|e| e.to_string()),
        })
    }
}

#[async_trait]
impl Checker for NetworkChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<CheckResult, CheckError> {
        let signals = self.collect_signals().await?;
        let result = evaluate(&signals);
        info!(
            "检测器 {}: {}/{} 个实例可达，聚合链路{}，结论 {}",
            self.name,
            signals.peer_success_count,
            signals.peer_count,
            if signals.aggregate_ok { "可达" } else { "不可达" },
            result.status()
        );
        Ok(result)
    }
}
