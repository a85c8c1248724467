//! CLI 命令定义
//!
//! 使用 clap derive 宏定义命令行接口结构。

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// 积分兑换命令行工具
#[derive(Parser, Debug)]
#[command(name = "rewards-redemption")]
#[command(version, about = "积分兑换引擎命令行工具")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// 子命令枚举
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 执行数据库迁移
    Migrate,

    /// 为用户开户（余额为 0）
    OpenAccount {
        #[arg(short, long)]
        user_id: String,
    },

    /// 查询积分余额
    Balance {
        #[arg(short, long)]
        user_id: String,
    },

    /// 积分入账
    Credit {
        #[arg(short, long)]
        user_id: String,

        #[arg(short, long)]
        points: i64,

        /// 入账原因
        #[arg(short, long, default_value = "manual")]
        reason: String,
    },

    /// 用积分兑换奖品
    Redeem {
        #[arg(short, long)]
        user_id: String,

        #[arg(short, long)]
        reward_id: String,
    },

    /// 取消待领取的兑换
    Cancel {
        #[arg(long)]
        redemption_id: Uuid,

        #[arg(short, long)]
        user_id: String,
    },

    /// 核销兑换记录
    Complete {
        #[arg(long)]
        redemption_id: Uuid,
    },

    /// 查询兑换历史
    History {
        #[arg(short, long)]
        user_id: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}
