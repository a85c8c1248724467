//! 积分账户服务
//!
//! 供注册流程开户、供积分发放流程（例如垃圾投递审核通过）入账。
//! 入账与兑换共用同一乐观并发提交，因此与并发兑换互不覆盖。

use std::sync::Arc;

use chrono::Utc;
use rewards_shared::retry::RetryPolicy;
use tracing::{info, instrument};

use super::run_transaction;
use super::validation::{validate_id, validate_points};
use crate::error::{RedemptionError, Result};
use crate::events::{EventPublisher, RedemptionEvent};
use crate::models::{EntityKind, UserAccount};
use crate::store::{RedemptionStore, Transaction};

/// 积分账户服务
pub struct PointsService {
    store: Arc<dyn RedemptionStore>,
    publisher: Arc<dyn EventPublisher>,
    retry_policy: RetryPolicy,
}

impl PointsService {
    pub fn new(
        store: Arc<dyn RedemptionStore>,
        publisher: Arc<dyn EventPublisher>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            publisher,
            retry_policy,
        }
    }

    /// 为新用户开户，余额为 0；账户已存在时原样返回
    #[instrument(skip(self))]
    pub async fn open_account(&self, user_id: &str) -> Result<UserAccount> {
        validate_id("user_id", user_id)?;

        let account = self
            .store
            .insert_account_if_absent(UserAccount::new(user_id, Utc::now()))
            .await?;
        Ok(account.into_inner())
    }

    /// 查询积分余额
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        validate_id("user_id", user_id)?;

        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found(EntityKind::Account, user_id))?;
        Ok(account.value.point_balance)
    }

    /// 积分入账
    #[instrument(skip(self), fields(user_id = %user_id, points = points))]
    pub async fn credit(&self, user_id: &str, points: i64, reason: &str) -> Result<UserAccount> {
        validate_id("user_id", user_id)?;
        validate_points(points)?;

        let account = run_transaction(&self.retry_policy, "credit", || {
            self.try_credit(user_id, points)
        })
        .await?;

        info!(point_balance = account.point_balance, reason, "积分已入账");

        self.publisher.publish(RedemptionEvent::PointsCredited {
            user_id: account.user_id.clone(),
            points,
            point_balance: account.point_balance,
            reason: reason.to_string(),
        });

        Ok(account)
    }

    async fn try_credit(&self, user_id: &str, points: i64) -> Result<UserAccount> {
        let snapshot = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found(EntityKind::Account, user_id))?;

        let mut account = snapshot.value.clone();
        account.credit(points, Utc::now())?;

        let mut tx = Transaction::new();
        tx.read(&snapshot).put_account(account.clone());
        self.store.commit(tx).await?;

        Ok(account)
    }
}
