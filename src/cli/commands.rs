//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::checkers::network::{PeerDiscovery, StaticDiscovery};
use crate::checkers::register_builtin;
use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{validate_node_name, Config, ConfigLoader, TomlConfigLoader};
use crate::error::{ConfigError, Result, VitalsError};
use crate::health::{CheckResult, CheckRunner, CheckScheduler, CheckerRegistry, RetryPolicy};
use crate::metrics::CheckMetrics;
use crate::status::FileStatusStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载并验证配置文件
pub async fn load_config(args: &Args) -> Result<Config> {
    let loader = TomlConfigLoader::new(true);
    loader.load_from_file(args.get_config_path()).await
}

/// 创建包含全部内置检测器的注册表
///
/// 网络检测器使用配置中的静态清单作为发现来源，并排除 `node_name` 上的实例。
pub fn build_registry(config: &Config, node_name: &str) -> CheckerRegistry {
    let discovery: Arc<dyn PeerDiscovery> =
        Arc::new(StaticDiscovery::from(config.discovery.clone()));
    let mut registry = CheckerRegistry::new();
    register_builtin(&mut registry, discovery, node_name);
    registry
}

/// 持续运行命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let config = load_config(args).await?;
        let registry = build_registry(&config, &config.global.node_name);
        let metrics = Arc::new(CheckMetrics::new());
        let scheduler = CheckScheduler::from_configs(&registry, &config.checkers, metrics.clone())?;

        info!(
            "节点 {} 启动 {} 个检测器",
            config.global.node_name,
            scheduler.schedules().len()
        );

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("收到中断信号，正在停止检测...");
                    signal_token.cancel();
                }
                Err(err) => {
                    error!("监听中断信号失败: {}", err);
                }
            }
        });

        let snapshot_task = metrics.start_snapshot_logging(
            Duration::from_secs(config.global.metrics_log_interval_seconds),
            shutdown.clone(),
        );

        let outcome = scheduler.run(shutdown.clone()).await;

        // 只有一次性检测器时调度器会自行结束，此时也要停止快照任务
        shutdown.cancel();
        if let Some(handle) = snapshot_task {
            handle.await?;
        }

        info!("检测已停止");
        outcome
    }
}

/// 单轮检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { node, format } = &args.command {
            let config = load_config(args).await?;
            let node_ref = node
                .clone()
                .unwrap_or_else(|| config.global.node_name.clone());
            let results = self.perform_pass(&config, &node_ref).await?;
            self.print_results(&node_ref, &results, *format)
        } else {
            Ok(())
        }
    }
}

impl CheckCommand {
    /// 构建全部检测器并执行一轮
    async fn perform_pass(
        &self,
        config: &Config,
        node_ref: &str,
    ) -> Result<BTreeMap<String, CheckResult>> {
        validate_node_name(node_ref).map_err(ConfigError::ValidationError)?;

        let registry = build_registry(config, node_ref);
        let checkers = config
            .checkers
            .iter()
            .map(|checker_config| registry.build(checker_config))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let store = Arc::new(FileStatusStore::new(&config.global.status_dir));
        let policy = RetryPolicy {
            max_attempts: config.global.retry_attempts,
            delay: Duration::from_secs(config.global.retry_delay_seconds),
        };

        let runner = config.checkers.iter().fold(
            CheckRunner::new(checkers, store, node_ref).with_policy(policy),
            |runner, checker_config| {
                runner.with_timeout(checker_config.name.clone(), checker_config.timeout())
            },
        );
        runner.run_once().await
    }

    /// 输出检测结果
    fn print_results(
        &self,
        node_ref: &str,
        results: &BTreeMap<String, CheckResult>,
        format: OutputFormat,
    ) -> Result<()> {
        match format {
            OutputFormat::Json => {
                let snapshots: BTreeMap<_, _> = results
                    .iter()
                    .map(|(name, result)| (name, result.snapshot()))
                    .collect();
                let output = serde_json::json!({
                    "node": node_ref,
                    "results": snapshots,
                });
                let text = serde_json::to_string_pretty(&output)
                    .map_err(|e| VitalsError::Other(e.into()))?;
                println!("{text}");
            }
            OutputFormat::Text => {
                println!("节点 {node_ref} 检测结果:");
                for (name, result) in results {
                    let status_icon = if result.status().is_healthy() {
                        "✓"
                    } else {
                        "✗"
                    };
                    println!("{} {} - {}", status_icon, name, result.status());
                    if let Some(detail) = result.detail() {
                        println!("  {}: {}", detail.code, detail.message);
                    }
                }
            }
        }
        Ok(())
    }
}

/// 验证配置命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { verbose } = &args.command {
            println!("验证配置文件: {}", args.get_config_path().display());
            let config = load_config(args).await?;

            // 构建一遍检测器，提前暴露构造错误
            let registry = build_registry(&config, &config.global.node_name);
            for checker_config in &config.checkers {
                registry.build(checker_config)?;
            }

            if *verbose {
                println!("配置验证通过！");
                println!("全局配置:");
                println!("  节点名称: {}", config.global.node_name);
                println!("  日志级别: {}", config.global.log_level);
                if let Some(log_file) = &config.global.log_file {
                    println!("  日志文件: {}", log_file.display());
                }
                println!("  状态目录: {}", config.global.status_dir.display());
                println!(
                    "  重试: {} 次，间隔 {}秒",
                    config.global.retry_attempts, config.global.retry_delay_seconds
                );

                println!("检测器配置:");
                for (i, checker) in config.checkers.iter().enumerate() {
                    println!("  {}. {} ({})", i + 1, checker.name, checker.checker_type);
                    if checker.interval_seconds == 0 {
                        println!("     间隔: 只运行一次");
                    } else {
                        println!("     间隔: {}秒", checker.interval_seconds);
                    }
                    if checker.timeout_seconds == 0 {
                        println!("     超时: 不限制");
                    } else {
                        println!("     超时: {}秒", checker.timeout_seconds);
                    }
                }
                println!(
                    "发现清单: {} 个实例，{} 个服务",
                    config.discovery.peers.len(),
                    config.discovery.services.len()
                );
            } else {
                println!("✓ 配置文件验证通过");
                println!("✓ 找到 {} 个检测器配置", config.checkers.len());
            }
            Ok(())
        } else {
            Ok(())
        }
    }
}
