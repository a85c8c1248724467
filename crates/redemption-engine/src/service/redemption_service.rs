//! 积分兑换服务
//!
//! 处理积分兑换奖品的核心业务逻辑，包括：
//! - 账户余额检查
//! - 奖品库存检查
//! - 兑换码生成（含碰撞检查）
//! - 扣积分、减库存、写账本三项写入的原子提交
//! - 取消兑换并退还积分
//!
//! ## 兑换流程
//!
//! 1. 读取账户与奖品快照 -> 2. 余额检查 -> 3. 库存检查 -> 4. 生成兑换码
//!    -> 5. 组装事务 -> 6. 提交（冲突时从 1 整体重试）-> 7. 发布变更事件
//!
//! ## 并发控制策略
//!
//! 不持有任何跨调用的锁。两个并发兑换同一奖品时，只有先提交的一方能通过版本校验，
//! 另一方重读快照后看到新的库存，因此不会超卖。

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use metrics::counter;
use rewards_shared::config::RedemptionConfig;
use rewards_shared::retry::RetryPolicy;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{UnconfirmedCommit, run_transaction};
use super::validation::validate_id;
use crate::code_generator::{CodeGenerator, RandomCodeGenerator};
use crate::error::{RedemptionError, Result};
use crate::events::{EventPublisher, NoopPublisher, RedemptionEvent};
use crate::models::{EntityKind, RedemptionRecord, RedemptionStatus};
use crate::store::{RedemptionStore, Transaction};

/// 兑换历史单次查询上限
pub const MAX_HISTORY_LIMIT: usize = 100;

/// 兑换提交结果
#[derive(Clone)]
struct RedeemOutcome {
    record: RedemptionRecord,
    point_balance: i64,
    remaining_stock: i64,
}

/// 取消提交结果
#[derive(Clone)]
struct CancelOutcome {
    record: RedemptionRecord,
    point_balance: i64,
    restored_stock: Option<i64>,
}

/// 积分兑换服务
///
/// 负责兑换与取消的完整事务流程。每次调用都是一次独立事务，
/// 调用方通过参数显式传入已认证的用户 ID。
pub struct RedemptionService {
    store: Arc<dyn RedemptionStore>,
    code_generator: Arc<dyn CodeGenerator>,
    publisher: Arc<dyn EventPublisher>,
    config: RedemptionConfig,
    retry_policy: RetryPolicy,
}

impl RedemptionService {
    pub fn new(
        store: Arc<dyn RedemptionStore>,
        code_generator: Arc<dyn CodeGenerator>,
        publisher: Arc<dyn EventPublisher>,
        config: RedemptionConfig,
    ) -> Self {
        let retry_policy = config.retry_policy();
        Self {
            store,
            code_generator,
            publisher,
            config,
            retry_policy,
        }
    }

    /// 使用随机兑换码、不发布事件、默认配置创建服务
    pub fn with_defaults(store: Arc<dyn RedemptionStore>) -> Self {
        Self::new(
            store,
            Arc::new(RandomCodeGenerator),
            Arc::new(NoopPublisher),
            RedemptionConfig::default(),
        )
    }

    pub fn config(&self) -> &RedemptionConfig {
        &self.config
    }

    /// 用积分兑换一件奖品
    ///
    /// 成功时返回新建的 PENDING 兑换记录（含兑换码），兑换码只在此处返回一次。
    /// 任何业务错误都不会产生写入。
    #[instrument(skip(self), fields(user_id = %user_id, reward_id = %reward_id))]
    pub async fn redeem(&self, user_id: &str, reward_id: &str) -> Result<RedemptionRecord> {
        validate_id("user_id", user_id)?;
        validate_id("reward_id", reward_id)?;

        let unconfirmed = UnconfirmedCommit::new();
        let unconfirmed = &unconfirmed;
        let result = run_transaction(&self.retry_policy, "redeem", || {
            self.try_redeem(user_id, reward_id, unconfirmed)
        })
        .await;

        match result {
            Ok(outcome) => {
                counter!("redemptions_total", "outcome" => "success").increment(1);
                info!(
                    redemption_id = %outcome.record.id,
                    cost = outcome.record.cost_snapshot,
                    point_balance = outcome.point_balance,
                    remaining_stock = outcome.remaining_stock,
                    "积分兑换成功"
                );

                self.publisher.publish(RedemptionEvent::Redeemed {
                    record: outcome.record.clone(),
                    point_balance: outcome.point_balance,
                    remaining_stock: outcome.remaining_stock,
                });

                Ok(outcome.record)
            }
            Err(e) => {
                counter!("redemptions_total", "outcome" => e.error_code()).increment(1);
                if e.is_business_error() {
                    info!(error = %e, "积分兑换被拒绝");
                } else {
                    warn!(error = %e, "积分兑换失败");
                }
                Err(e)
            }
        }
    }

    /// 取消一条待领取的兑换记录并退还积分
    ///
    /// 默认不回补库存；开启 `restore_stock_on_cancel` 后在同一事务内库存加一。
    /// 对已取消或已核销的记录重复调用返回 InvalidStateTransition，不会重复退款。
    #[instrument(skip(self), fields(redemption_id = %redemption_id, user_id = %user_id))]
    pub async fn cancel(&self, redemption_id: Uuid, user_id: &str) -> Result<()> {
        validate_id("user_id", user_id)?;

        let unconfirmed = UnconfirmedCommit::new();
        let unconfirmed = &unconfirmed;
        let result = run_transaction(&self.retry_policy, "cancel", || {
            self.try_cancel(redemption_id, user_id, unconfirmed)
        })
        .await;

        match result {
            Ok(outcome) => {
                counter!("redemption_cancellations_total", "outcome" => "success").increment(1);
                info!(
                    refunded_points = outcome.record.cost_snapshot,
                    point_balance = outcome.point_balance,
                    restored_stock = ?outcome.restored_stock,
                    "兑换已取消，积分已退还"
                );

                self.publisher.publish(RedemptionEvent::Cancelled {
                    redemption_id: outcome.record.id,
                    user_id: outcome.record.user_id.clone(),
                    reward_id: outcome.record.reward_id.clone(),
                    refunded_points: outcome.record.cost_snapshot,
                    point_balance: outcome.point_balance,
                    restored_stock: outcome.restored_stock,
                    cancelled_at: outcome.record.cancelled_at.unwrap_or_else(Utc::now),
                });

                Ok(())
            }
            Err(e) => {
                counter!("redemption_cancellations_total", "outcome" => e.error_code())
                    .increment(1);
                if e.is_business_error() {
                    info!(error = %e, "取消兑换被拒绝");
                } else {
                    warn!(error = %e, "取消兑换失败");
                }
                Err(e)
            }
        }
    }

    /// 核销兑换记录（PENDING -> COMPLETED）
    ///
    /// 供线下履约流程调用，不涉及积分与库存。
    #[instrument(skip(self), fields(redemption_id = %redemption_id))]
    pub async fn complete(&self, redemption_id: Uuid) -> Result<RedemptionRecord> {
        let unconfirmed = UnconfirmedCommit::new();
        let unconfirmed = &unconfirmed;
        let record = run_transaction(&self.retry_policy, "complete", || {
            self.try_complete(redemption_id, unconfirmed)
        })
        .await?;

        info!(user_id = %record.user_id, "兑换已核销");

        self.publisher.publish(RedemptionEvent::Completed {
            redemption_id: record.id,
            user_id: record.user_id.clone(),
            completed_at: record.completed_at.unwrap_or_else(Utc::now),
        });

        Ok(record)
    }

    /// 查询单条兑换记录，只能查询自己的记录
    pub async fn get_redemption(&self, redemption_id: Uuid, user_id: &str) -> Result<RedemptionRecord> {
        validate_id("user_id", user_id)?;

        let record = self
            .store
            .get_redemption(redemption_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found(EntityKind::Redemption, redemption_id))?
            .into_inner();

        if !record.is_owned_by(user_id) {
            return Err(RedemptionError::Unauthorized { redemption_id });
        }
        Ok(record)
    }

    /// 查询用户兑换历史（按创建时间倒序）
    #[instrument(skip(self), fields(user_id = %user_id, limit = %limit))]
    pub async fn list_user_redemptions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RedemptionRecord>> {
        validate_id("user_id", user_id)?;

        self.store
            .list_redemptions_by_user(user_id, limit.min(MAX_HISTORY_LIMIT))
            .await
    }

    // ==================== 私有方法 ====================

    /// 单次兑换尝试
    async fn try_redeem(
        &self,
        user_id: &str,
        reward_id: &str,
        unconfirmed: &UnconfirmedCommit<RedeemOutcome>,
    ) -> Result<RedeemOutcome> {
        // 0. 上次提交结果未知：兑换记录已落库说明已生效
        if let Some(outcome) = unconfirmed.pending() {
            if self.store.get_redemption(outcome.record.id).await?.is_some() {
                info!(redemption_id = %outcome.record.id, "上次提交已生效，不再重复兑换");
                return Ok(outcome);
            }
        }

        // 1. 读取快照
        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found(EntityKind::Account, user_id))?;
        let reward = self
            .store
            .get_reward(reward_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found(EntityKind::Reward, reward_id))?;

        let now = Utc::now();
        let cost = reward.value.cost;

        // 2. 余额检查
        let mut new_account = account.value.clone();
        new_account.debit(cost, now)?;

        // 3. 库存检查
        let mut new_reward = reward.value.clone();
        new_reward.take_one(now)?;

        // 4. 生成兑换码
        let code = self.generate_code().await?;
        let record = RedemptionRecord::pending(user_id, reward_id, cost, code, now);

        // 5. 三项写入同一事务提交
        let outcome = RedeemOutcome {
            record: record.clone(),
            point_balance: new_account.point_balance,
            remaining_stock: new_reward.stock,
        };

        let mut tx = Transaction::new();
        tx.read(&account)
            .read(&reward)
            .put_account(new_account)
            .put_reward(new_reward)
            .insert_redemption(record);
        unconfirmed
            .commit(self.store.as_ref(), tx, outcome.clone())
            .await?;

        Ok(outcome)
    }

    /// 单次取消尝试
    async fn try_cancel(
        &self,
        redemption_id: Uuid,
        user_id: &str,
        unconfirmed: &UnconfirmedCommit<CancelOutcome>,
    ) -> Result<CancelOutcome> {
        if let Some(outcome) = unconfirmed.pending() {
            if self.is_committed(&outcome.record).await? {
                info!("上次提交已生效，不再重复退款");
                return Ok(outcome);
            }
        }

        let record = self
            .store
            .get_redemption(redemption_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found(EntityKind::Redemption, redemption_id))?;

        if !record.value.is_owned_by(user_id) {
            return Err(RedemptionError::Unauthorized { redemption_id });
        }

        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found(EntityKind::Account, user_id))?;

        // 与 PostgreSQL 时间精度一致，便于提交结果核对
        let now = Utc::now().trunc_subsecs(6);
        let mut cancelled = record.value.clone();
        cancelled.transition_to(RedemptionStatus::Cancelled, now)?;

        let mut new_account = account.value.clone();
        new_account.credit(cancelled.cost_snapshot, now)?;
        let point_balance = new_account.point_balance;

        let mut tx = Transaction::new();
        tx.read(&record)
            .read(&account)
            .put_redemption(cancelled.clone())
            .put_account(new_account);

        let restored_stock = if self.config.restore_stock_on_cancel {
            let reward = self
                .store
                .get_reward(&cancelled.reward_id)
                .await?
                .ok_or_else(|| RedemptionError::not_found(EntityKind::Reward, &cancelled.reward_id))?;
            let mut new_reward = reward.value.clone();
            new_reward.return_one(now)?;
            let stock = new_reward.stock;
            tx.read(&reward).put_reward(new_reward);
            Some(stock)
        } else {
            None
        };

        let outcome = CancelOutcome {
            record: cancelled,
            point_balance,
            restored_stock,
        };
        unconfirmed
            .commit(self.store.as_ref(), tx, outcome.clone())
            .await?;

        Ok(outcome)
    }

    async fn try_complete(
        &self,
        redemption_id: Uuid,
        unconfirmed: &UnconfirmedCommit<RedemptionRecord>,
    ) -> Result<RedemptionRecord> {
        if let Some(completed) = unconfirmed.pending() {
            if self.is_committed(&completed).await? {
                return Ok(completed);
            }
        }

        let record = self
            .store
            .get_redemption(redemption_id)
            .await?
            .ok_or_else(|| RedemptionError::not_found(EntityKind::Redemption, redemption_id))?;

        let mut completed = record.value.clone();
        completed.transition_to(RedemptionStatus::Completed, Utc::now().trunc_subsecs(6))?;

        let mut tx = Transaction::new();
        tx.read(&record).put_redemption(completed.clone());
        unconfirmed
            .commit(self.store.as_ref(), tx, completed.clone())
            .await?;

        Ok(completed)
    }

    /// 存储中的记录是否正是本次调用写入的状态
    ///
    /// 状态变更时间精确到微秒，其他调用写入的同一状态不会相等。
    async fn is_committed(&self, expected: &RedemptionRecord) -> Result<bool> {
        let current = self.store.get_redemption(expected.id).await?;
        Ok(current.is_some_and(|c| c.value == *expected))
    }

    /// 生成账本中尚未使用的兑换码
    ///
    /// 预检只能降低碰撞概率，最终唯一性由提交时的唯一约束保证。
    async fn generate_code(&self) -> Result<String> {
        let max_attempts = self.config.max_code_attempts.max(1);

        for attempt in 1..=max_attempts {
            let code = self.code_generator.generate();
            if !self.store.code_exists(&code).await? {
                return Ok(code);
            }
            warn!(attempt, max_attempts, "兑换码已存在，重新生成");
        }

        Err(RedemptionError::CodeGenerationExhausted {
            attempts: max_attempts,
        })
    }
}
