//! Cluster Vitals - 集群健康检测引擎
//!
//! 按配置周期性地运行可插拔的检测器，并给出三态（健康/不健康/未知）结论：
//! - 检测器抽象与注册表
//! - 带间隔与超时的并发调度
//! - 带重试的顺序执行与状态聚合
//! - 基于对等实例与聚合链路的网络连通性判定
//! - 结构化日志记录

pub mod checkers;
pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod status;

// 重新导出主要类型
pub use config::{CheckerConfig, Config, GlobalConfig};
pub use error::VitalsError;
pub use health::{CheckResult, CheckStatus, Checker, CheckerRegistry};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
