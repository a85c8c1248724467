//! 积分兑换引擎命令行入口
//!
//! 连接配置中的 PostgreSQL 数据库，执行单条兑换相关命令，结果以 JSON 输出。

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rewards_redemption::cli::{Cli, CommandRunner, Commands};
use rewards_redemption::{PgStore, RedemptionEngine};
use rewards_shared::config::AppConfig;
use rewards_shared::observability;
use tracing::info;

const SERVICE_NAME: &str = "rewards-redemption";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(SERVICE_NAME).context("加载配置失败")?;

    // 命令行参数覆盖配置文件中的日志级别，RUST_LOG 优先级最高
    let observability_config = config.observability.clone().with_log_level(&cli.log_level);
    observability::init(&observability_config)?;

    info!(environment = %config.environment, "启动 {}", SERVICE_NAME);

    let store = PgStore::connect(&config.database)
        .await
        .context("连接数据库失败")?;

    let result = match cli.command {
        Commands::Migrate => {
            store.migrate().await?;
            serde_json::json!({ "migrated": true })
        }
        command => {
            let engine = RedemptionEngine::new(Arc::new(store.clone()), config.redemption.clone());
            CommandRunner::new(engine).run(command).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);

    store.close().await;
    Ok(())
}
