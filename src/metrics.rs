//! 检测指标模块
//!
//! 维护一个按 `(检测器类型, 检测器名称, 状态, 错误码)` 计数的进程内计数器，
//! 调度器每次运行检测后恰好递增一次。

use crate::error::CheckError;
use crate::health::result::{CheckResult, CheckStatus, CODE_HEALTHY, CODE_RUN_ERROR};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 计数器标签
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CheckCounterKey {
    /// 检测器类型
    pub checker_type: String,
    /// 检测器名称
    pub checker_name: String,
    /// 结果状态标签
    pub status: String,
    /// 错误码
    pub error_code: String,
}

/// 对一次检测运行结果的分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunClassification {
    /// 分类后的状态
    pub status: CheckStatus,
    /// 分类后的错误码
    pub code: String,
}

impl RunClassification {
    /// 对检测运行结果分类
    ///
    /// 返回错误时视为 Unknown 并使用通用错误码；成功时按结果状态分类，
    /// 非健康结果沿用其自身的错误码。
    pub fn of(outcome: &Result<CheckResult, CheckError>) -> Self {
        match outcome {
            Err(_) => Self {
                status: CheckStatus::Unknown,
                code: CODE_RUN_ERROR.to_string(),
            },
            Ok(result) => Self {
                status: result.status(),
                code: result.code().unwrap_or(CODE_HEALTHY).to_string(),
            },
        }
    }
}

/// 检测指标计数器
#[derive(Debug, Default)]
pub struct CheckMetrics {
    counters: Mutex<HashMap<CheckCounterKey, u64>>,
}

impl CheckMetrics {
    /// 创建新的计数器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次检测事件
    pub fn record(
        &self,
        checker_type: &str,
        checker_name: &str,
        status: CheckStatus,
        error_code: &str,
    ) {
        let key = CheckCounterKey {
            checker_type: checker_type.to_string(),
            checker_name: checker_name.to_string(),
            status: status.as_label().to_string(),
            error_code: error_code.to_string(),
        };

        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(key).or_insert(0) += 1;
    }

    /// 记录一次已分类的检测运行
    pub fn record_run(&self, checker_type: &str, checker_name: &str, run: &RunClassification) {
        self.record(checker_type, checker_name, run.status, &run.code);
    }

    /// 读取指定标签组合的计数
    pub fn count(
        &self,
        checker_type: &str,
        checker_name: &str,
        status: CheckStatus,
        error_code: &str,
    ) -> u64 {
        let key = CheckCounterKey {
            checker_type: checker_type.to_string(),
            checker_name: checker_name.to_string(),
            status: status.as_label().to_string(),
            error_code: error_code.to_string(),
        };
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.get(&key).copied().unwrap_or(0)
    }

    /// 指定检测器的全部计数之和
    pub fn total_for(&self, checker_name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters
            .iter()
            .filter(|(key, _)| key.checker_name == checker_name)
            .map(|(_, count)| *count)
            .sum()
    }

    /// 获取全部计数的快照
    pub fn snapshot(&self) -> Vec<(CheckCounterKey, u64)> {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(CheckCounterKey, u64)> =
            counters.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|(a, _), (b, _)| {
            (&a.checker_name, &a.status, &a.error_code).cmp(&(&b.checker_name, &b.status, &b.error_code))
        });
        entries
    }

    /// 以 JSON 格式输出一次指标快照日志
    pub fn log_snapshot(&self) {
        let entries = self.snapshot();
        if entries.is_empty() {
            return;
        }

        let metrics_entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "type": "metrics",
            "checks": entries
                .iter()
                .map(|(key, count)| json!({
                    "checker_type": key.checker_type,
                    "checker_name": key.checker_name,
                    "status": key.status,
                    "error_code": key.error_code,
                    "count": count,
                }))
                .collect::<Vec<_>>(),
        });

        tracing::info!("{metrics_entry}");
    }

    /// 启动周期性的指标快照日志任务，直到取消
    pub fn start_snapshot_logging(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }

        let metrics = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            // 第一次 tick 立即完成，跳过
            interval_timer.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval_timer.tick() => metrics.log_snapshot(),
                }
            }
            metrics.log_snapshot();
        }))
    }
}
