//! 检测器抽象
//!
//! 每种具体的健康检测都实现 [`Checker`]，由调度器或重试执行器驱动。

use crate::error::CheckError;
use crate::health::result::CheckResult;
use async_trait::async_trait;
use std::time::Duration;

/// 检测器trait，定义检测接口
///
/// 超时与取消由调用方负责：调用方通过限制或丢弃 `run` 返回的 future
/// 来施加截止时间。
#[async_trait]
pub trait Checker: Send + Sync {
    /// 检测器名称，在一份配置内唯一
    fn name(&self) -> &str;

    /// 执行一次检测
    ///
    /// # 返回
    /// * `Ok(CheckResult)` - 检测得出的健康结论
    /// * `Err(CheckError)` - 基础设施或传输层面的失败
    async fn run(&self) -> Result<CheckResult, CheckError>;
}

/// 在可选的超时限制下执行一次检测
///
/// `timeout` 为零表示不设上限。
pub async fn run_with_timeout(
    checker: &dyn Checker,
    timeout: Duration,
) -> Result<CheckResult, CheckError> {
    if timeout.is_zero() {
        return checker.run().await;
    }

    match tokio::time::timeout(timeout, checker.run()).await {
        Ok(outcome) => outcome,
        Err(_) => Err(CheckError::Timeout(timeout)),
    }
}
