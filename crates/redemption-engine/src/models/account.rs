//! 积分账户

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RedemptionError, Result};

/// 用户积分账户
///
/// 每个用户一条记录，余额始终非负。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub user_id: String,
    pub point_balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// 注册时创建的空账户
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            point_balance: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_afford(&self, cost: i64) -> bool {
        self.point_balance >= cost
    }

    /// 扣减积分，余额不足时不做任何修改
    pub fn debit(&mut self, amount: i64, now: DateTime<Utc>) -> Result<()> {
        if !self.can_afford(amount) {
            return Err(RedemptionError::InsufficientPoints {
                required: amount,
                available: self.point_balance,
            });
        }
        self.point_balance -= amount;
        self.updated_at = now;
        Ok(())
    }

    /// 增加积分
    pub fn credit(&mut self, amount: i64, now: DateTime<Utc>) -> Result<()> {
        if amount <= 0 {
            return Err(RedemptionError::Validation(format!(
                "积分增加数量必须为正数: {}",
                amount
            )));
        }
        self.point_balance = self.point_balance.checked_add(amount).ok_or_else(|| {
            RedemptionError::Validation(format!("积分余额溢出: user_id={}", self.user_id))
        })?;
        self.updated_at = now;
        Ok(())
    }
}
