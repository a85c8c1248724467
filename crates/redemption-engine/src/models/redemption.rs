//! 兑换记录与状态机
//!
//! 记录由兑换操作创建（PENDING），之后只允许两种迁移：
//!
//! - PENDING -> COMPLETED：由外部履约流程完成
//! - PENDING -> CANCELLED：由用户取消，退还积分
//!
//! 终态记录不可再修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RedemptionError, Result};

/// 兑换记录状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedemptionStatus {
    /// 待领取 - 积分已扣减，等待线下核销
    #[default]
    Pending,
    /// 已完成 - 奖品已领取
    Completed,
    /// 已取消 - 积分已退还
    Cancelled,
}

impl RedemptionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// 检查状态迁移是否合法
    pub fn can_transition_to(&self, to: RedemptionStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Completed) | (Self::Pending, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// 兑换记录
///
/// 账本中的一条兑换流水。cost_snapshot 保存兑换时的价格，之后目录调价不影响退款金额。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub reward_id: String,
    pub cost_snapshot: i64,
    /// 线下领取用的兑换码
    pub code: String,
    pub status: RedemptionStatus,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RedemptionRecord {
    /// 创建 PENDING 状态的新记录
    pub fn pending(
        user_id: impl Into<String>,
        reward_id: impl Into<String>,
        cost_snapshot: i64,
        code: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            reward_id: reward_id.into(),
            cost_snapshot,
            code: code.into(),
            status: RedemptionStatus::Pending,
            created_at: now,
            cancelled_at: None,
            completed_at: None,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// 执行状态迁移
    ///
    /// 非法迁移返回 InvalidStateTransition，记录保持不变。
    pub fn transition_to(&mut self, to: RedemptionStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(RedemptionError::InvalidStateTransition {
                redemption_id: self.id,
                from: self.status,
                to,
            });
        }

        match to {
            RedemptionStatus::Cancelled => self.cancelled_at = Some(now),
            RedemptionStatus::Completed => self.completed_at = Some(now),
            RedemptionStatus::Pending => {}
        }
        self.status = to;
        Ok(())
    }
}
