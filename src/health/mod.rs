//! 检测执行模块
//!
//! 提供检测器抽象、注册表、结果模型、周期调度器以及带重试的顺序执行器

pub mod checker;
pub mod registry;
pub mod result;
pub mod runner;
pub mod scheduler;

// 重新导出主要类型
pub use checker::{run_with_timeout, Checker};
pub use registry::{CheckerConstructor, CheckerRegistry};
pub use result::{CheckDetail, CheckResult, CheckStatus, ResultSnapshot, CODE_HEALTHY, CODE_RUN_ERROR};
pub use runner::{CheckRunner, RetryPolicy};
pub use scheduler::{CheckScheduler, CheckerSchedule};
