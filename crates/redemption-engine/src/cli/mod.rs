//! 命令行工具
//!
//! 面向运维与联调的命令行入口，直接调用兑换引擎的公开操作。

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::CommandRunner;
