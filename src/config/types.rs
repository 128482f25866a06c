//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::checkers::network::discovery::{PeerInstance, ServiceEntry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构，包含全局配置、检测器列表和静态服务发现清单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 检测器配置列表
    #[serde(default)]
    pub checkers: Vec<CheckerConfig>,
    /// 静态服务发现清单
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 当前被检测的节点名称，状态按节点持久化
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 日志文件路径，不设置时输出到控制台
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// 文件状态存储目录
    #[serde(default = "default_status_dir")]
    pub status_dir: PathBuf,
    /// 重试执行器的最大尝试次数
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// 重试间隔（秒）
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    /// 指标快照日志间隔（秒，0 表示不输出）
    #[serde(default = "default_metrics_log_interval")]
    pub metrics_log_interval_seconds: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            log_level: default_log_level(),
            log_file: None,
            status_dir: default_status_dir(),
            retry_attempts: default_retry_attempts(),
            retry_delay_seconds: default_retry_delay(),
            metrics_log_interval_seconds: default_metrics_log_interval(),
        }
    }
}

/// 检测器配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckerConfig {
    /// 检测器名称（需符合 DNS label 规范）
    pub name: String,
    /// 检测器类型标签
    #[serde(rename = "type")]
    pub checker_type: String,
    /// 检测间隔（秒，0 表示只运行一次）
    #[serde(default)]
    pub interval_seconds: u64,
    /// 单次检测超时（秒，0 表示不限制）
    #[serde(default)]
    pub timeout_seconds: u64,
    /// 网络可达性检测参数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkCheckerSpec>,
}

impl CheckerConfig {
    /// 检测间隔
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// 单次检测超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// 可达性探测使用的协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeProtocol {
    /// UDP 上的 DNS 查询
    #[default]
    Dns,
    /// HTTP GET 请求
    Http,
}

/// 网络可达性检测参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkCheckerSpec {
    /// 对等实例所在命名空间
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// 对等实例标签选择器
    #[serde(default = "default_peer_selector")]
    pub peer_selector: String,
    /// 聚合服务名称
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// 探测协议
    #[serde(default)]
    pub protocol: ProbeProtocol,
    /// 探测端口
    #[serde(default = "default_probe_port")]
    pub port: u16,
    /// DNS 探测使用的查询名
    #[serde(default = "default_query_name")]
    pub query_name: String,
    /// HTTP 探测使用的路径
    #[serde(default = "default_http_path")]
    pub http_path: String,
    /// 单个探测的超时（秒）
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    /// 额外排除的节点
    #[serde(default)]
    pub excluded_nodes: Vec<String>,
}

impl Default for NetworkCheckerSpec {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            peer_selector: default_peer_selector(),
            service_name: default_service_name(),
            protocol: ProbeProtocol::default(),
            port: default_probe_port(),
            query_name: default_query_name(),
            http_path: default_http_path(),
            probe_timeout_seconds: default_probe_timeout(),
            excluded_nodes: Vec::new(),
        }
    }
}

impl NetworkCheckerSpec {
    /// 单个探测的超时
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

/// 静态服务发现清单
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DiscoveryConfig {
    /// 对等实例列表
    #[serde(default)]
    pub peers: Vec<PeerInstance>,
    /// 服务列表
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

// 默认值函数
fn default_node_name() -> String {
    "localhost".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_status_dir() -> PathBuf {
    std::env::temp_dir().join("cluster-vitals")
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    3
}
fn default_metrics_log_interval() -> u64 {
    300
}
fn default_namespace() -> String {
    "kube-system".to_string()
}
fn default_peer_selector() -> String {
    "k8s-app=kube-dns".to_string()
}
fn default_service_name() -> String {
    "kube-dns".to_string()
}
fn default_probe_port() -> u16 {
    53
}
fn default_query_name() -> String {
    "kubernetes.default.svc.cluster.local".to_string()
}
fn default_http_path() -> String {
    "/".to_string()
}
fn default_probe_timeout() -> u64 {
    5
}

/// 已知的检测器类型标签
pub const NETWORK_CHECKER_TYPE: &str = "network";

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.node_name.trim().is_empty() {
        return Err("节点名称不能为空".to_string());
    }
    validate_node_name(&config.global.node_name)?;

    if config.global.retry_attempts == 0 {
        return Err("重试次数不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证检测器配置
    if config.checkers.is_empty() {
        return Err("至少需要配置一个检测器".to_string());
    }

    let dns_label = Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$")
        .map_err(|e| format!("正则表达式错误: {e}"))?;

    let mut seen = HashSet::new();
    for checker in &config.checkers {
        if !dns_label.is_match(&checker.name) {
            return Err(format!(
                "检测器名称 {:?} 不符合 DNS label 规范（小写字母、数字和'-'，最长63个字符）",
                checker.name
            ));
        }

        if !seen.insert(checker.name.as_str()) {
            return Err(format!("检测器名称重复: {}", checker.name));
        }

        if checker.checker_type.trim().is_empty() {
            return Err(format!("检测器 {} 未指定类型", checker.name));
        }

        if checker.checker_type == NETWORK_CHECKER_TYPE {
            let Some(ref spec) = checker.network else {
                return Err(format!("检测器 {} 缺少 [network] 参数", checker.name));
            };
            if spec.port == 0 {
                return Err(format!("检测器 {} 的探测端口不能为0", checker.name));
            }
            if spec.probe_timeout_seconds == 0 {
                return Err(format!("检测器 {} 的探测超时不能为0", checker.name));
            }
            if spec.service_name.trim().is_empty() {
                return Err(format!("检测器 {} 的服务名称不能为空", checker.name));
            }
        }
    }

    Ok(())
}

/// 验证节点名称
///
/// 节点名称同时是状态文件名，必须符合 DNS subdomain 规范（小写字母、数字、
/// '-' 和 '.'，最长253个字符）。
pub fn validate_node_name(name: &str) -> Result<(), String> {
    let dns_subdomain =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .map_err(|e| format!("正则表达式错误: {e}"))?;

    if name.len() > 253 || !dns_subdomain.is_match(name) {
        return Err(format!("节点名称 {name:?} 不符合 DNS subdomain 规范"));
    }
    Ok(())
}
