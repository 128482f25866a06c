//! 连通性判定

use crate::health::result::CheckResult;

/// 可用对等实例不足
pub const CODE_INSUFFICIENT_PEERS: &str = "InsufficientPeers";
/// 聚合链路正常但所有对等实例不可达
pub const CODE_PEER_CONNECTIVITY_FAILURE: &str = "PeerConnectivityFailure";
/// 部分对等实例可达但聚合链路不可达
pub const CODE_AGGREGATE_LINK_FAILURE: &str = "AggregateLinkFailure";
/// 对等实例与聚合链路均不可达
pub const CODE_COMPLETE_FAILURE: &str = "CompleteFailure";

/// 一次网络检测收集到的连通性信号
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivitySignals {
    /// 过滤后的可用对等实例数量
    pub peer_count: usize,
    /// 探测成功的对等实例数量
    pub peer_success_count: usize,
    /// 聚合（服务级）探测是否成功
    pub aggregate_ok: bool,
    /// 聚合探测失败原因
    pub aggregate_error: Option<String>,
}

impl ConnectivitySignals {
    /// 对等实例不足时的信号，不需要实际探测
    pub fn insufficient(peer_count: usize) -> Self {
        Self {
            peer_count,
            ..Self::default()
        }
    }
}

/// 根据连通性信号给出结论
///
/// 按顺序匹配，首个命中的条件决定结论：
///
/// | 条件 | 结论 | 错误码 |
/// |---|---|---|
/// | `peer_count <= 1` | Unknown | `InsufficientPeers` |
/// | 聚合成功且至少一个对等实例成功 | Healthy | - |
/// | 聚合成功且对等实例全部失败 | Unhealthy | `PeerConnectivityFailure` |
/// | 聚合失败且至少一个对等实例成功 | Unhealthy | `AggregateLinkFailure` |
/// | 聚合失败且对等实例全部失败 | Unhealthy | `CompleteFailure` |
pub fn evaluate(signals: &ConnectivitySignals) -> CheckResult {
    let ConnectivitySignals {
        peer_count,
        peer_success_count,
        aggregate_ok,
        ref aggregate_error,
    } = *signals;

    if peer_count <= 1 {
        return CheckResult::unknown(
            CODE_INSUFFICIENT_PEERS,
            format!("insufficient peers for conclusive test: 仅发现 {peer_count} 个可用实例"),
        );
    }

    let aggregate_reason = aggregate_error.as_deref().unwrap_or("无响应");

    match (aggregate_ok, peer_success_count > 0) {
        (true, true) => CheckResult::healthy(),
        (true, false) => CheckResult::unhealthy(
            CODE_PEER_CONNECTIVITY_FAILURE,
            format!("聚合链路可达，但 {peer_count} 个对等实例均不可达"),
        ),
        (false, true) => CheckResult::unhealthy(
            CODE_AGGREGATE_LINK_FAILURE,
            format!(
                "{peer_success_count}/{peer_count} 个对等实例可达，但聚合链路不可达: {aggregate_reason}"
            ),
        ),
        (false, false) => CheckResult::unhealthy(
            CODE_COMPLETE_FAILURE,
            format!("{peer_count} 个对等实例与聚合链路均不可达: {aggregate_reason}"),
        ),
    }
}
