//! 端到端场景测试
//!
//! 通过静态发现与可控的探测器驱动网络检测器，以及用内存状态存储驱动
//! 重试执行器和调度器。

use async_trait::async_trait;
use cluster_vitals::checkers::network::{
    NetworkChecker, PeerInstance, PeerPhase, ReachabilityProber, ServiceEntry, StaticDiscovery,
    CODE_COMPLETE_FAILURE, CODE_INSUFFICIENT_PEERS,
};
use cluster_vitals::config::{CheckerConfig, ConfigLoader, NetworkCheckerSpec, TomlConfigLoader};
use cluster_vitals::error::CheckError;
use cluster_vitals::health::{
    CheckResult, CheckRunner, CheckScheduler, CheckStatus, Checker, CheckerRegistry, RetryPolicy,
    CODE_RUN_ERROR,
};
use cluster_vitals::metrics::CheckMetrics;
use cluster_vitals::status::MemoryStatusStore;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

const SERVICE_ADDRESS: &str = "10.96.0.10";

/// 只认为给定地址可达的探测器
struct StubProber {
    reachable: HashSet<IpAddr>,
}

impl StubProber {
    fn new(reachable: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            reachable: reachable.iter().map(|a| a.parse().unwrap()).collect(),
        })
    }
}

#[async_trait]
impl ReachabilityProber for StubProber {
    async fn probe(&self, target: SocketAddr) -> Result<(), CheckError> {
        if self.reachable.contains(&target.ip()) {
            Ok(())
        } else {
            Err(CheckError::Timeout(Duration::from_secs(5)))
        }
    }
}

fn peer(name: &str, node: &str, address: &str) -> PeerInstance {
    PeerInstance {
        name: name.to_string(),
        namespace: "kube-system".to_string(),
        node_name: node.to_string(),
        phase: PeerPhase::Running,
        ready: true,
        address: Some(address.parse().unwrap()),
        labels: [("k8s-app".to_string(), "kube-dns".to_string())]
            .into_iter()
            .collect(),
    }
}

fn network_checker(peers: Vec<PeerInstance>, reachable: &[&str]) -> NetworkChecker {
    let discovery = StaticDiscovery::new(
        peers,
        vec![ServiceEntry {
            name: "kube-dns".to_string(),
            namespace: "kube-system".to_string(),
            address: SERVICE_ADDRESS.parse().unwrap(),
        }],
    );
    NetworkChecker::new(
        "cluster-dns",
        NetworkCheckerSpec::default(),
        "node-0",
        Arc::new(discovery),
        StubProber::new(reachable),
    )
}

#[tokio::test]
async fn scenario_a_partial_peer_success_is_healthy() {
    let checker = network_checker(
        vec![
            peer("coredns-a", "node-1", "10.0.0.1"),
            peer("coredns-b", "node-2", "10.0.0.2"),
            peer("coredns-c", "node-3", "10.0.0.3"),
        ],
        &["10.0.0.1", "10.0.0.2", SERVICE_ADDRESS],
    );

    let result = checker.run().await.unwrap();
    assert_eq!(result, CheckResult::healthy());
    assert!(result.detail().is_none());
}

#[tokio::test]
async fn scenario_b_nothing_reachable_is_complete_failure() {
    let checker = network_checker(
        vec![
            peer("coredns-a", "node-1", "10.0.0.1"),
            peer("coredns-b", "node-2", "10.0.0.2"),
        ],
        &[],
    );

    let result = checker.run().await.unwrap();
    assert_eq!(result.status(), CheckStatus::Unhealthy);
    assert_eq!(result.code(), Some(CODE_COMPLETE_FAILURE));
}

#[tokio::test]
async fn scenario_c_single_peer_is_inconclusive() {
    let checker = network_checker(
        vec![
            peer("coredns-a", "node-1", "10.0.0.1"),
            // 位于被检测节点上，不参与探测
            peer("coredns-local", "node-0", "10.0.0.9"),
        ],
        &["10.0.0.1", "10.0.0.9", SERVICE_ADDRESS],
    );

    let result = checker.run().await.unwrap();
    assert_eq!(result.status(), CheckStatus::Unknown);
    assert_eq!(result.code(), Some(CODE_INSUFFICIENT_PEERS));
    assert!(result
        .message()
        .unwrap()
        .contains("insufficient peers for conclusive test"));
}

struct AlwaysHealthy;

#[async_trait]
impl Checker for AlwaysHealthy {
    fn name(&self) -> &str {
        "always-healthy"
    }

    async fn run(&self) -> Result<CheckResult, CheckError> {
        Ok(CheckResult::healthy())
    }
}

struct AlwaysErroring {
    calls: AtomicUsize,
}

#[async_trait]
impl Checker for AlwaysErroring {
    fn name(&self) -> &str {
        "always-erroring"
    }

    async fn run(&self) -> Result<CheckResult, CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CheckError::Probe("connection reset".to_string()))
    }
}

#[tokio::test]
async fn scenario_d_runner_aggregates_healthy_and_unknown() {
    let store = Arc::new(MemoryStatusStore::new());
    let erroring = Arc::new(AlwaysErroring {
        calls: AtomicUsize::new(0),
    });
    let runner = CheckRunner::new(
        vec![
            Arc::new(AlwaysHealthy) as Arc<dyn Checker>,
            erroring.clone() as Arc<dyn Checker>,
        ],
        store.clone(),
        "node-0",
    )
    .with_policy(RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(1),
    });

    assert_ok!(runner.run_once().await);

    let status = store.current("node-0").await.unwrap();
    assert_eq!(status.results.len(), 2);
    assert_eq!(
        status.result("always-healthy").unwrap().status,
        CheckStatus::Healthy
    );
    let failed = status.result("always-erroring").unwrap();
    assert_eq!(failed.status, CheckStatus::Unknown);
    assert_eq!(failed.code.as_deref(), Some(CODE_RUN_ERROR));
    assert!(failed.message.as_deref().unwrap().contains('3'));
    assert_eq!(erroring.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn scheduler_runs_registry_built_checkers_until_cancelled() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = CheckerRegistry::new();
    let counter = calls.clone();
    registry.register("counting", move |config: &CheckerConfig| {
        struct Counting {
            name: String,
            calls: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Checker for Counting {
            fn name(&self) -> &str {
                &self.name
            }

            async fn run(&self) -> Result<CheckResult, CheckError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(CheckResult::healthy())
            }
        }

        Ok(Arc::new(Counting {
            name: config.name.clone(),
            calls: counter.clone(),
        }) as Arc<dyn Checker>)
    });

    let loader = TomlConfigLoader::new(false);
    let config = loader
        .load_from_string(
            r#"
[[checkers]]
name = "once"
type = "counting"

[[checkers]]
name = "ticking"
type = "counting"
interval_seconds = 1
"#,
        )
        .await
        .unwrap();

    let metrics = Arc::new(CheckMetrics::new());
    let scheduler = CheckScheduler::from_configs(&registry, &config.checkers, metrics.clone())
        .unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(metrics.total_for("once"), 1);
    assert!(metrics.total_for("ticking") >= 2);
    assert_eq!(
        calls.load(Ordering::SeqCst) as u64,
        metrics.total_for("once") + metrics.total_for("ticking")
    );
}
