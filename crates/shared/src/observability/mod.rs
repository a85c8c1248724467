//! 统一可观测性模块
//!
//! 提供结构化日志的统一初始化。所有入口通过单一入口点配置日志格式与级别，
//! 确保字段命名一致。

pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志来源
    pub service_name: String,

    /// 日志级别（如 "info", "debug"）
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// 覆盖日志级别
    pub fn with_log_level(mut self, log_level: &str) -> Self {
        self.log_level = log_level.to_string();
        self
    }
}

/// 统一初始化可观测性
///
/// # Example
///
/// ```ignore
/// use rewards_shared::observability::{init, ObservabilityConfig};
///
/// let config = ObservabilityConfig::default().with_log_level("debug");
/// init(&config)?;
/// ```
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;

    info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "Observability initialized"
    );

    Ok(())
}
