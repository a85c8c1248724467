//! 共享库
//!
//! 包含积分兑换服务共用的配置、重试与日志等基础设施代码。

pub mod config;
pub mod observability;
pub mod retry;
pub mod test_utils;
