//! 内置检测器
//!
//! 目前只有网络连通性检测器，启动时通过 [`register_builtin`] 注册到注册表。

pub mod network;

pub use network::NetworkChecker;

use crate::config::NETWORK_CHECKER_TYPE;
use crate::health::checker::Checker;
use crate::health::registry::CheckerRegistry;
use network::PeerDiscovery;
use std::sync::Arc;

/// 注册全部内置检测器
///
/// # 参数
/// * `registry` - 注册表
/// * `discovery` - 网络检测器使用的发现接口
/// * `node_name` - 被检测节点
pub fn register_builtin(
    registry: &mut CheckerRegistry,
    discovery: Arc<dyn PeerDiscovery>,
    node_name: &str,
) {
    let node_name = node_name.to_string();
    registry.register(NETWORK_CHECKER_TYPE, move |config| {
        let checker = NetworkChecker::from_config(config, &node_name, Arc::clone(&discovery))?;
        Ok(Arc::new(checker) as Arc<dyn Checker>)
    });
}
