//! Cluster Vitals 主程序入口
//!
//! 集群健康检测引擎

use anyhow::{Context, Result};
use clap::Parser;
use cluster_vitals::cli::args::{Args, Commands};
use cluster_vitals::cli::commands::{
    load_config, CheckCommand, Command, RunCommand, ValidateCommand,
};
use cluster_vitals::logging::{LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 命令行未指定的日志选项使用配置文件中的设置
    let global = load_config(&args).await.ok().map(|config| config.global);
    let log_level = match args.log_level {
        Some(level) => level.to_string(),
        None => global
            .as_ref()
            .map(|global| global.log_level.clone())
            .unwrap_or_else(|| "info".to_string()),
    };
    let log_file = args
        .log_file
        .clone()
        .or_else(|| global.and_then(|global| global.log_file));

    let log_config = LogConfig::console(&log_level, args.json_logs).with_file(log_file);
    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Cluster Vitals v{} 启动", cluster_vitals::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Run => RunCommand.execute(args).await.context("运行检测失败"),
        Commands::Check { .. } => CheckCommand.execute(args).await.context("单轮检测失败"),
        Commands::Validate { .. } => ValidateCommand
            .execute(args)
            .await
            .context("配置验证失败"),
    }
}
