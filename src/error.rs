//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use std::time::Duration;
use thiserror::Error;

/// Cluster Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum VitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 检测器构建错误
    #[error("检测器构建错误: {0}")]
    Build(#[from] BuildError),

    /// 检测执行错误
    #[error("检测执行错误: {0}")]
    Check(#[from] CheckError),

    /// 状态持久化错误
    #[error("状态持久化错误: {0}")]
    Persist(#[from] PersistError),

    /// 调度任务异常退出
    #[error("调度任务异常退出: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 检测器构建错误类型
#[derive(Error, Debug)]
pub enum BuildError {
    /// 未注册的检测器类型
    #[error("未知的检测器类型: {checker_type}")]
    UnknownCheckerType { checker_type: String },

    /// 构造函数返回错误
    #[error("构建检测器 {name} (类型 {checker_type}) 失败: {source}")]
    Constructor {
        name: String,
        checker_type: String,
        #[source]
        source: anyhow::Error,
    },
}

/// 检测执行错误类型
///
/// 表示基础设施层面的失败，与健康结论（Healthy/Unhealthy/Unknown）相互独立。
#[derive(Error, Debug)]
pub enum CheckError {
    /// 服务发现失败
    #[error("服务发现失败: {0}")]
    Discovery(#[from] DiscoveryError),

    /// 单次检测超时
    #[error("检测超时: {0:?}")]
    Timeout(Duration),

    /// 检测被取消
    #[error("检测已取消")]
    Cancelled,

    /// 探测过程错误
    #[error("探测失败: {0}")]
    Probe(String),
}

/// 服务发现错误类型
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    /// 列举对等实例失败
    #[error("列举实例失败 (namespace={namespace}, selector={selector}): {reason}")]
    ListPeers {
        namespace: String,
        selector: String,
        reason: String,
    },

    /// 服务不存在
    #[error("服务不存在: {namespace}/{name}")]
    ServiceNotFound { namespace: String, name: String },

    /// 标签选择器格式错误
    #[error("无效的标签选择器: {0}")]
    InvalidSelector(String),
}

/// 状态持久化错误类型
#[derive(Error, Debug)]
pub enum PersistError {
    /// 读取状态失败
    #[error("读取状态失败 {key}: {reason}")]
    Read { key: String, reason: String },

    /// 写入状态失败
    #[error("写入状态失败 {key}: {reason}")]
    Write { key: String, reason: String },
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, VitalsError>;
