//! 重试执行器
//!
//! 按顺序对固定的检测器列表各执行一次（带有限次数的重试），
//! 然后把全部结果一次性合并写入状态存储。

use crate::error::{PersistError, VitalsError};
use crate::health::checker::{run_with_timeout, Checker};
use crate::health::result::{CheckResult, CODE_RUN_ERROR};
use crate::status::StatusStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含首次）
    pub max_attempts: u32,
    /// 两次尝试之间的固定间隔
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

/// 重试执行器
pub struct CheckRunner {
    checkers: Vec<Arc<dyn Checker>>,
    store: Arc<dyn StatusStore>,
    node_ref: String,
    policy: RetryPolicy,
    timeouts: HashMap<String, Duration>,
}

impl CheckRunner {
    /// 创建重试执行器
    ///
    /// # 参数
    /// * `checkers` - 按执行顺序排列的检测器
    /// * `store` - 状态存储
    /// * `node_ref` - 被检测节点，即状态存储中的键
    pub fn new(
        checkers: Vec<Arc<dyn Checker>>,
        store: Arc<dyn StatusStore>,
        node_ref: impl Into<String>,
    ) -> Self {
        Self {
            checkers,
            store,
            node_ref: node_ref.into(),
            policy: RetryPolicy::default(),
            timeouts: HashMap::new(),
        }
    }

    /// 设置重试策略
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 为指定检测器设置单次尝试的超时，零表示不限制
    pub fn with_timeout(mut self, checker_name: impl Into<String>, timeout: Duration) -> Self {
        self.timeouts.insert(checker_name.into(), timeout);
        self
    }

    /// 当前重试策略
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// 执行一轮检测并持久化
    ///
    /// 单个检测器的失败会降级为 Unknown 结果，不会中断本轮；只有状态读取或
    /// 写回失败才会返回错误，读取失败时不会写入任何内容。
    pub async fn run_once(&self) -> Result<BTreeMap<String, CheckResult>, VitalsError> {
        let pass_id = Uuid::new_v4();
        info!(
            "开始检测轮次 {}: 节点 {}，检测器数量 {}",
            pass_id,
            self.node_ref,
            self.checkers.len()
        );

        let mut results = BTreeMap::new();
        for checker in &self.checkers {
            let result = self.run_with_retry(checker.as_ref()).await;
            results.insert(checker.name().to_string(), result);
        }

        self.persist(&results).await?;

        info!("检测轮次 {} 完成，结果已写入节点 {}", pass_id, self.node_ref);
        Ok(results)
    }

    /// 带重试地执行单个检测器
    ///
    /// 每次尝试受该检测器的超时限制，超时计为一次失败。重试间隔的等待不响应取消。
    pub async fn run_with_retry(&self, checker: &dyn Checker) -> CheckResult {
        let max_attempts = self.policy.max_attempts.max(1);
        let timeout = self
            .timeouts
            .get(checker.name())
            .copied()
            .unwrap_or(Duration::ZERO);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match run_with_timeout(checker, timeout).await {
                Ok(result) => {
                    debug!(
                        "检测器 {} 第 {} 次尝试成功: {}",
                        checker.name(),
                        attempt,
                        result.status()
                    );
                    return result;
                }
                Err(e) => {
                    warn!(
                        "检测器 {} 第 {}/{} 次尝试失败: {}",
                        checker.name(),
                        attempt,
                        max_attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "未知错误".to_string());
        CheckResult::unknown(
            CODE_RUN_ERROR,
            format!("检测在 {max_attempts} 次尝试后仍然失败: {last_error}"),
        )
    }

    /// 读取当前状态，按名称替换条目后一次性写回
    async fn persist(&self, results: &BTreeMap<String, CheckResult>) -> Result<(), PersistError> {
        let mut status = self.store.get(&self.node_ref).await?;
        status.merge(results);
        self.store.update(status).await
    }
}
