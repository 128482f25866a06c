//! 任务调度器模块
//!
//! 每个检测计划在独立的 tokio 任务中按固定间隔运行，所有任务由同一个
//! 取消令牌控制，并由一个等待全部任务结束的屏障汇合。

use crate::config::CheckerConfig;
use crate::error::{CheckError, VitalsError};
use crate::health::checker::{run_with_timeout, Checker};
use crate::health::registry::CheckerRegistry;
use crate::health::result::CheckResult;
use crate::metrics::{CheckMetrics, RunClassification};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 检测计划：检测器及其运行间隔与超时
///
/// 启动时由注册表构建，之后不再修改。
#[derive(Clone)]
pub struct CheckerSchedule {
    /// 检测器类型标签（用于指标）
    pub checker_type: String,
    /// 运行间隔，零表示只运行一次
    pub interval: Duration,
    /// 单次运行超时，零表示不限制
    pub timeout: Duration,
    /// 检测器实例
    pub checker: Arc<dyn Checker>,
}

impl CheckerSchedule {
    /// 创建检测计划
    pub fn new(
        checker_type: impl Into<String>,
        interval: Duration,
        timeout: Duration,
        checker: Arc<dyn Checker>,
    ) -> Self {
        Self {
            checker_type: checker_type.into(),
            interval,
            timeout,
            checker,
        }
    }

    /// 是否为一次性计划
    pub fn is_one_shot(&self) -> bool {
        self.interval.is_zero()
    }

    /// 检测器名称
    pub fn name(&self) -> &str {
        self.checker.name()
    }
}

impl std::fmt::Debug for CheckerSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckerSchedule")
            .field("name", &self.name())
            .field("checker_type", &self.checker_type)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// 检测调度器
pub struct CheckScheduler {
    schedules: Vec<CheckerSchedule>,
    metrics: Arc<CheckMetrics>,
}

impl CheckScheduler {
    /// 使用已构建的检测计划创建调度器
    pub fn new(schedules: Vec<CheckerSchedule>, metrics: Arc<CheckMetrics>) -> Self {
        Self { schedules, metrics }
    }

    /// 根据检测器配置构建全部检测计划
    ///
    /// 任何一个检测器构建失败都会直接返回错误，此时尚未开始任何调度。
    pub fn from_configs(
        registry: &CheckerRegistry,
        configs: &[CheckerConfig],
        metrics: Arc<CheckMetrics>,
    ) -> Result<Self, VitalsError> {
        let schedules = configs
            .iter()
            .map(|config| {
                let checker = registry.build(config)?;
                Ok(CheckerSchedule::new(
                    config.checker_type.clone(),
                    config.interval(),
                    config.timeout(),
                    checker,
                ))
            })
            .collect::<Result<Vec<_>, VitalsError>>()?;

        Ok(Self::new(schedules, metrics))
    }

    /// 检测计划列表
    pub fn schedules(&self) -> &[CheckerSchedule] {
        &self.schedules
    }

    /// 运行全部检测计划直到结束
    ///
    /// 周期性计划只在 `shutdown` 被取消后退出，其运行结果只记录日志和指标；
    /// 一次性计划运行一次后即结束，只有它们的错误会被返回。
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), VitalsError> {
        info!("启动检测调度器，检测计划数量: {}", self.schedules.len());

        let (labels, handles): (Vec<_>, Vec<_>) = self
            .schedules
            .into_iter()
            .map(|schedule| {
                let metrics = Arc::clone(&self.metrics);
                let shutdown = shutdown.clone();
                let one_shot = schedule.is_one_shot();
                let name = schedule.name().to_string();
                let handle = tokio::spawn(async move {
                    if schedule.is_one_shot() {
                        run_one_shot(schedule, metrics, shutdown).await
                    } else {
                        run_periodic(schedule, metrics, shutdown).await;
                        Ok(())
                    }
                });
                ((one_shot, name), handle)
            })
            .unzip();

        let mut first_error = None;
        let joined = futures::future::join_all(handles).await;
        for ((one_shot, name), joined) in labels.into_iter().zip(joined) {
            let outcome = match joined {
                Ok(outcome) => outcome.map_err(VitalsError::from),
                // 周期任务异常退出只记录日志
                Err(join_error) if !one_shot => {
                    error!("周期检测任务异常退出 {}: {}", name, join_error);
                    continue;
                }
                Err(join_error) => Err(VitalsError::from(join_error)),
            };
            if let Err(e) = outcome {
                error!("检测任务失败 {}: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        info!("检测调度器已停止");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 运行一次检测并记录分类指标
async fn execute(
    schedule: &CheckerSchedule,
    metrics: &CheckMetrics,
    shutdown: &CancellationToken,
) -> Result<CheckResult, CheckError> {
    let name = schedule.name();
    debug!("开始检测: {}", name);

    let outcome = tokio::select! {
        _ = shutdown.cancelled() => Err(CheckError::Cancelled),
        outcome = run_with_timeout(schedule.checker.as_ref(), schedule.timeout) => outcome,
    };

    if matches!(outcome, Err(CheckError::Cancelled)) {
        debug!("检测被取消: {}", name);
        return outcome;
    }

    let run = RunClassification::of(&outcome);
    metrics.record_run(&schedule.checker_type, name, &run);

    match &outcome {
        Ok(result) if result.status().is_healthy() => debug!("检测正常: {}", name),
        Ok(result) => warn!(
            "检测结论: {} {} [{}] {}",
            name,
            result.status(),
            run.code,
            result.message().unwrap_or("N/A")
        ),
        Err(e) => error!("检测执行失败 {}: {}", name, e),
    }

    outcome
}

async fn run_one_shot(
    schedule: CheckerSchedule,
    metrics: Arc<CheckMetrics>,
    shutdown: CancellationToken,
) -> Result<(), CheckError> {
    info!("运行一次性检测: {}", schedule.name());
    execute(&schedule, &metrics, &shutdown).await.map(|_| ())
}

async fn run_periodic(
    schedule: CheckerSchedule,
    metrics: Arc<CheckMetrics>,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(schedule.interval);
    // 运行超出间隔时顺延下一次，不补偿错过的 tick
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "启动周期检测任务: {} (间隔 {:?}, 超时 {:?})",
        schedule.name(),
        schedule.interval,
        schedule.timeout
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                // 结果只用于日志和指标，不影响后续调度
                let _ = execute(&schedule, &metrics, &shutdown).await;
            }
        }
    }

    info!("停止周期检测任务: {}", schedule.name());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::result::{CheckStatus, CODE_HEALTHY, CODE_RUN_ERROR};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingChecker {
        name: String,
        calls: AtomicUsize,
        running: AtomicBool,
        overlapped: AtomicBool,
        delay: Duration,
        fail: bool,
    }

    impl CountingChecker {
        fn new(name: &str, delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                calls: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
                delay,
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Checker for CountingChecker {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self) -> Result<CheckResult, CheckError> {
            if self.running.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.store(false, Ordering::SeqCst);
            if self.fail {
                Err(CheckError::Probe("模拟失败".to_string()))
            } else {
                Ok(CheckResult::healthy())
            }
        }
    }

    fn schedule(checker: Arc<CountingChecker>, interval: Duration, timeout: Duration) -> CheckerSchedule {
        CheckerSchedule::new("fake", interval, timeout, checker)
    }

    #[tokio::test]
    async fn test_one_shot_runs_exactly_once_with_open_token() {
        let checker = CountingChecker::new("once", Duration::from_millis(5), false);
        let metrics = Arc::new(CheckMetrics::new());
        let scheduler = CheckScheduler::new(
            vec![schedule(checker.clone(), Duration::ZERO, Duration::ZERO)],
            metrics.clone(),
        );

        // 令牌从不取消，只有一次性计划时调度器仍应自行结束
        let token = CancellationToken::new();
        let result = tokio::time::timeout(Duration::from_secs(5), scheduler.run(token)).await;

        assert!(result.expect("调度器应当结束").is_ok());
        assert_eq!(checker.calls(), 1);
        assert_eq!(metrics.count("fake", "once", CheckStatus::Healthy, CODE_HEALTHY), 1);
    }

    #[tokio::test]
    async fn test_one_shot_error_propagates() {
        let checker = CountingChecker::new("once-bad", Duration::ZERO, true);
        let metrics = Arc::new(CheckMetrics::new());
        let scheduler = CheckScheduler::new(
            vec![schedule(checker.clone(), Duration::ZERO, Duration::ZERO)],
            metrics.clone(),
        );

        let result = scheduler.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(VitalsError::Check(CheckError::Probe(_)))));
        assert_eq!(
            metrics.count("fake", "once-bad", CheckStatus::Unknown, CODE_RUN_ERROR),
            1
        );
    }

    #[tokio::test]
    async fn test_periodic_runs_until_cancelled_and_swallows_errors() {
        let checker = CountingChecker::new("periodic", Duration::ZERO, true);
        let metrics = Arc::new(CheckMetrics::new());
        let scheduler = CheckScheduler::new(
            vec![schedule(checker.clone(), Duration::from_millis(20), Duration::ZERO)],
            metrics.clone(),
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));
        tokio::time::sleep(Duration::from_millis(130)).await;
        token.cancel();

        let result = handle.await.unwrap();
        assert!(result.is_ok(), "周期任务的错误不应向外传播");

        let calls = checker.calls();
        assert!(calls >= 3, "至少应运行3次，实际 {calls}");
        assert_eq!(metrics.total_for("periodic") as usize, calls);
    }

    #[tokio::test]
    async fn test_periodic_runs_never_overlap() {
        // 运行时间超过间隔时下一次 tick 顺延
        let checker = CountingChecker::new("slow", Duration::from_millis(30), false);
        let metrics = Arc::new(CheckMetrics::new());
        let scheduler = CheckScheduler::new(
            vec![schedule(checker.clone(), Duration::from_millis(10), Duration::ZERO)],
            metrics,
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert!(checker.calls() >= 2);
        assert!(!checker.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_timeout_recorded_as_unknown() {
        let checker = CountingChecker::new("hangs", Duration::from_secs(10), false);
        let metrics = Arc::new(CheckMetrics::new());
        let scheduler = CheckScheduler::new(
            vec![schedule(checker.clone(), Duration::ZERO, Duration::from_millis(20))],
            metrics.clone(),
        );

        let result = scheduler.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(VitalsError::Check(CheckError::Timeout(_)))));
        assert_eq!(
            metrics.count("fake", "hangs", CheckStatus::Unknown, CODE_RUN_ERROR),
            1
        );
    }

    #[tokio::test]
    async fn test_mixed_schedules_join_on_cancel() {
        let once = CountingChecker::new("once", Duration::ZERO, false);
        let periodic = CountingChecker::new("periodic", Duration::ZERO, false);
        let metrics = Arc::new(CheckMetrics::new());
        let scheduler = CheckScheduler::new(
            vec![
                schedule(once.clone(), Duration::ZERO, Duration::ZERO),
                schedule(periodic.clone(), Duration::from_millis(10), Duration::ZERO),
            ],
            metrics,
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_finished(), "周期计划未取消前屏障不应完成");

        token.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(once.calls(), 1);
        assert!(periodic.calls() >= 2);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_runs() {
        let once = CountingChecker::new("once-slow", Duration::from_secs(10), false);
        let periodic = CountingChecker::new("periodic-slow", Duration::from_secs(10), false);
        let metrics = Arc::new(CheckMetrics::new());
        let scheduler = CheckScheduler::new(
            vec![
                schedule(once.clone(), Duration::ZERO, Duration::ZERO),
                schedule(periodic.clone(), Duration::from_secs(1), Duration::ZERO),
            ],
            metrics.clone(),
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(once.calls(), 1);
        assert_eq!(periodic.calls(), 1);
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("取消后屏障应当及时完成")
            .unwrap();
        assert!(matches!(result, Err(VitalsError::Check(CheckError::Cancelled))));
        assert_eq!(metrics.total_for("once-slow"), 0);
        assert_eq!(metrics.total_for("periodic-slow"), 0);
    }

    struct PanickingChecker;

    #[async_trait]
    impl Checker for PanickingChecker {
        fn name(&self) -> &str {
            "panics"
        }

        async fn run(&self) -> Result<CheckResult, CheckError> {
            panic!("检测器崩溃");
        }
    }

    #[tokio::test]
    async fn test_periodic_panic_is_not_propagated() {
        let scheduler = CheckScheduler::new(
            vec![CheckerSchedule::new(
                "fake",
                Duration::from_millis(10),
                Duration::ZERO,
                Arc::new(PanickingChecker),
            )],
            Arc::new(CheckMetrics::new()),
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        assert!(handle.await.unwrap().is_ok());
    }

    #[test]
    fn test_from_configs_fails_on_unknown_type() {
        let registry = CheckerRegistry::new();
        let configs = vec![CheckerConfig {
            name: "dns".to_string(),
            checker_type: "nope".to_string(),
            interval_seconds: 10,
            timeout_seconds: 5,
            network: None,
        }];

        let result = CheckScheduler::from_configs(&registry, &configs, Arc::new(CheckMetrics::new()));
        assert!(matches!(result, Err(VitalsError::Build(_))));
    }
}
