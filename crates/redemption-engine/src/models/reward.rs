//! 奖品目录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RedemptionError, Result};

/// 奖品目录条目
///
/// 由运营后台维护价格与库存，兑换引擎只读取 cost 并扣减 stock。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RewardListing {
    pub reward_id: String,
    pub name: String,
    /// 兑换所需积分，必须为正
    pub cost: i64,
    /// 剩余库存
    pub stock: i64,
    /// 展示用元数据（图片、描述等），引擎不解析
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RewardListing {
    pub fn new(
        reward_id: impl Into<String>,
        name: impl Into<String>,
        cost: i64,
        stock: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            reward_id: reward_id.into(),
            name: name.into(),
            cost,
            stock,
            metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    /// 校验目录数据是否合法
    pub fn validate(&self) -> Result<()> {
        if self.cost <= 0 {
            return Err(RedemptionError::Validation(format!(
                "奖品积分价格必须为正数: reward_id={}, cost={}",
                self.reward_id, self.cost
            )));
        }
        if self.stock < 0 {
            return Err(RedemptionError::Validation(format!(
                "奖品库存不能为负: reward_id={}, stock={}",
                self.reward_id, self.stock
            )));
        }
        Ok(())
    }

    pub fn has_stock(&self) -> bool {
        self.stock > 0
    }

    /// 扣减一件库存
    pub fn take_one(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.has_stock() {
            return Err(RedemptionError::OutOfStock(self.reward_id.clone()));
        }
        self.stock -= 1;
        self.updated_at = now;
        Ok(())
    }

    /// 回补一件库存（取消兑换且开启回补策略时）
    pub fn return_one(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.stock = self.stock.checked_add(1).ok_or_else(|| {
            RedemptionError::Validation(format!("奖品库存溢出: reward_id={}", self.reward_id))
        })?;
        self.updated_at = now;
        Ok(())
    }
}
