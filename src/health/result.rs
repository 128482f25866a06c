//! 健康检测结果数据结构
//!
//! 定义三态健康结论及其附带的错误码与描述

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 健康结论为 Healthy 时记录的指标错误码
pub const CODE_HEALTHY: &str = "Healthy";

/// 检测返回基础设施错误时使用的通用错误码
pub const CODE_RUN_ERROR: &str = "RunError";

/// 健康状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// 健康
    Healthy,
    /// 不健康
    Unhealthy,
    /// 无法得出结论
    Unknown,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Healthy => write!(f, "健康"),
            CheckStatus::Unhealthy => write!(f, "不健康"),
            CheckStatus::Unknown => write!(f, "未知"),
        }
    }
}

impl CheckStatus {
    /// 判断状态是否为健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, CheckStatus::Healthy)
    }

    /// 指标标签使用的小写名称
    pub fn as_label(&self) -> &'static str {
        match self {
            CheckStatus::Healthy => "healthy",
            CheckStatus::Unhealthy => "unhealthy",
            CheckStatus::Unknown => "unknown",
        }
    }
}

/// 非健康结论的附加信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDetail {
    /// 机器可读的错误码
    pub code: String,
    /// 人类可读的描述
    pub message: String,
}

/// 单次检测结果
///
/// 字段私有：只能通过构造函数创建，保证状态不为 Healthy 时一定带有
/// 错误码和描述，为 Healthy 时一定没有。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<CheckDetail>,
}

impl CheckResult {
    /// 健康结果
    pub fn healthy() -> Self {
        Self {
            status: CheckStatus::Healthy,
            detail: None,
        }
    }

    /// 不健康结果
    pub fn unhealthy(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_detail(CheckStatus::Unhealthy, code, message)
    }

    /// 未知结果
    pub fn unknown(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_detail(CheckStatus::Unknown, code, message)
    }

    fn with_detail(status: CheckStatus, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(CheckDetail {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// 健康状态
    pub fn status(&self) -> CheckStatus {
        self.status
    }

    /// 附加信息
    pub fn detail(&self) -> Option<&CheckDetail> {
        self.detail.as_ref()
    }

    /// 错误码
    pub fn code(&self) -> Option<&str> {
        self.detail.as_ref().map(|d| d.code.as_str())
    }

    /// 错误描述
    pub fn message(&self) -> Option<&str> {
        self.detail.as_ref().map(|d| d.message.as_str())
    }

    /// 生成带时间戳的持久化快照
    pub fn snapshot(&self) -> ResultSnapshot {
        ResultSnapshot {
            status: self.status,
            code: self.code().map(str::to_string),
            message: self.message().map(str::to_string),
            checked_at: Utc::now(),
        }
    }
}

/// 持久化到状态存储中的结果快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    /// 健康状态
    pub status: CheckStatus,
    /// 错误码
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// 错误描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
}
