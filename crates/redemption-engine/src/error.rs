//! 兑换引擎错误类型
//!
//! 业务错误（余额不足、库存不足、状态不合法等）是终态错误，不在内部重试；
//! 基础设施错误（并发冲突、存储不可用）在服务内有限次重试后才返回给调用方。

use thiserror::Error;
use uuid::Uuid;

use crate::models::{EntityKind, RedemptionStatus};

/// 兑换引擎错误类型
#[derive(Debug, Error)]
pub enum RedemptionError {
    // === 业务错误 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("记录不存在: {entity} id={id}")]
    RecordNotFound { entity: EntityKind, id: String },

    #[error("积分不足: 需要 {required}, 可用 {available}")]
    InsufficientPoints { required: i64, available: i64 },

    #[error("奖品库存不足: reward_id={0}")]
    OutOfStock(String),

    #[error("无权操作该兑换记录: redemption_id={redemption_id}")]
    Unauthorized { redemption_id: Uuid },

    #[error("兑换记录状态不允许此操作: redemption_id={redemption_id}, {from} -> {to}")]
    InvalidStateTransition {
        redemption_id: Uuid,
        from: RedemptionStatus,
        to: RedemptionStatus,
    },

    #[error("兑换码生成失败，已尝试 {attempts} 次")]
    CodeGenerationExhausted { attempts: u32 },

    // === 基础设施错误（对外） ===
    #[error("并发冲突重试已用尽，请稍后重试: attempts={attempts}")]
    TransientConflict { attempts: u32 },

    #[error("存储不可用: {0}")]
    StorageUnavailable(String),

    // === 存储层内部错误，由服务层重试或转换 ===
    #[error("并发冲突，请重试")]
    ConcurrencyConflict,

    #[error("兑换码重复: {0}")]
    DuplicateCode(String),

    #[error("数据库错误: {0}")]
    Database(sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 兑换引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, RedemptionError>;

/// PostgreSQL 事务冲突类错误码：serialization_failure、deadlock_detected
const TRANSACTION_CONFLICT_CODES: [&str; 2] = ["40001", "40P01"];

impl From<sqlx::Error> for RedemptionError {
    /// 连接类故障归为存储不可用，事务冲突与版本冲突同等重试，其余数据库错误保留原始信息
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => Self::StorageUnavailable(err.to_string()),
            sqlx::Error::Database(ref db_err)
                if db_err
                    .code()
                    .is_some_and(|code| TRANSACTION_CONFLICT_CODES.contains(&&*code)) =>
            {
                Self::ConcurrencyConflict
            }
            other => Self::Database(other),
        }
    }
}

impl RedemptionError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::RecordNotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// 检查是否为服务内可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict | Self::DuplicateCode(_) | Self::StorageUnavailable(_)
        )
    }

    /// 检查是否为业务错误（调用方应视为最终结果，不必重试）
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::RecordNotFound { .. }
                | Self::InsufficientPoints { .. }
                | Self::OutOfStock(_)
                | Self::Unauthorized { .. }
                | Self::InvalidStateTransition { .. }
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            Self::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            Self::OutOfStock(_) => "OUT_OF_STOCK",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::CodeGenerationExhausted { .. } => "CODE_GENERATION_EXHAUSTED",
            Self::TransientConflict { .. } => "TRANSIENT_CONFLICT",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::DuplicateCode(_) => "DUPLICATE_CODE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
