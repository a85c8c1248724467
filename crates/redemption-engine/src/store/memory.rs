//! 内存存储
//!
//! 使用读写锁保护的内存表实现乐观并发提交，适用于测试、开发环境和单进程部署。
//! 锁只在单次读取或单次提交内持有，提交的版本校验与写入在同一临界区内完成。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::transaction::{EntityKey, Mutation, Transaction, Versioned};
use super::RedemptionStore;
use crate::error::{RedemptionError, Result};
use crate::models::{RedemptionRecord, RewardListing, UserAccount};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<String, Versioned<UserAccount>>,
    rewards: HashMap<String, Versioned<RewardListing>>,
    redemptions: HashMap<Uuid, Versioned<RedemptionRecord>>,
    codes: HashSet<String>,
}

impl MemoryState {
    fn current_version(&self, key: &EntityKey) -> Option<u64> {
        match key {
            EntityKey::Account(id) => self.accounts.get(id).map(|v| v.version),
            EntityKey::Reward(id) => self.rewards.get(id).map(|v| v.version),
            EntityKey::Redemption(id) => self.redemptions.get(id).map(|v| v.version),
        }
    }

    /// 校验事务，全部通过后才允许写入
    fn validate(&self, tx: &Transaction) -> Result<()> {
        for (key, expected) in tx.reads() {
            if self.current_version(key) != Some(expected) {
                debug!(entity = %key, expected, "读快照已过期");
                return Err(RedemptionError::ConcurrencyConflict);
            }
        }

        let mut pending_codes = HashSet::new();
        for mutation in tx.mutations() {
            match mutation {
                Mutation::InsertRedemption(record) => {
                    if self.redemptions.contains_key(&record.id) {
                        return Err(RedemptionError::Internal(format!(
                            "兑换记录已存在: {}",
                            record.id
                        )));
                    }
                    if self.codes.contains(&record.code) || !pending_codes.insert(&record.code) {
                        return Err(RedemptionError::DuplicateCode(record.code.clone()));
                    }
                }
                Mutation::PutAccount(account) if account.point_balance < 0 => {
                    return Err(RedemptionError::Internal(format!(
                        "积分余额不能为负: user_id={}",
                        account.user_id
                    )));
                }
                Mutation::PutReward(reward) if reward.stock < 0 => {
                    return Err(RedemptionError::Internal(format!(
                        "库存不能为负: reward_id={}",
                        reward.reward_id
                    )));
                }
                _ => {
                    let key = mutation.entity_key();
                    if tx.expected_version(&key).is_none() {
                        return Err(RedemptionError::Internal(format!(
                            "更新前未读取实体: {}",
                            key
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, tx: Transaction) {
        let bump = |key: &EntityKey| tx.expected_version(key).unwrap_or(0) + 1;

        for mutation in tx.mutations().iter().cloned() {
            let key = mutation.entity_key();
            match mutation {
                Mutation::PutAccount(account) => {
                    let version = bump(&key);
                    self.accounts
                        .insert(account.user_id.clone(), Versioned::new(account, version));
                }
                Mutation::PutReward(reward) => {
                    let version = bump(&key);
                    self.rewards
                        .insert(reward.reward_id.clone(), Versioned::new(reward, version));
                }
                Mutation::InsertRedemption(record) => {
                    self.codes.insert(record.code.clone());
                    self.redemptions.insert(record.id, Versioned::initial(record));
                }
                Mutation::PutRedemption(record) => {
                    let version = bump(&key);
                    self.redemptions.insert(record.id, Versioned::new(record, version));
                }
            }
        }
    }
}

/// 内存版兑换存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 兑换记录总数
    pub fn redemption_count(&self) -> usize {
        self.state.read().redemptions.len()
    }
}

#[async_trait]
impl RedemptionStore for MemoryStore {
    async fn get_account(&self, user_id: &str) -> Result<Option<Versioned<UserAccount>>> {
        Ok(self.state.read().accounts.get(user_id).cloned())
    }

    async fn get_reward(&self, reward_id: &str) -> Result<Option<Versioned<RewardListing>>> {
        Ok(self.state.read().rewards.get(reward_id).cloned())
    }

    async fn get_redemption(&self, id: Uuid) -> Result<Option<Versioned<RedemptionRecord>>> {
        Ok(self.state.read().redemptions.get(&id).cloned())
    }

    async fn list_redemptions_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RedemptionRecord>> {
        let state = self.state.read();
        let mut records: Vec<RedemptionRecord> = state
            .redemptions
            .values()
            .filter(|v| v.value.user_id == user_id)
            .map(|v| v.value.clone())
            .collect();
        // UUID v7 按时间递增，作为同一时刻创建时的次级排序键
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        Ok(self.state.read().codes.contains(code))
    }

    async fn insert_account_if_absent(
        &self,
        account: UserAccount,
    ) -> Result<Versioned<UserAccount>> {
        let mut state = self.state.write();
        let entry = state
            .accounts
            .entry(account.user_id.clone())
            .or_insert_with(|| Versioned::initial(account));
        Ok(entry.clone())
    }

    async fn upsert_reward(&self, reward: RewardListing) -> Result<Versioned<RewardListing>> {
        reward.validate()?;

        let mut state = self.state.write();
        let version = state
            .rewards
            .get(&reward.reward_id)
            .map_or(1, |existing| existing.version + 1);
        let versioned = Versioned::new(reward, version);
        state
            .rewards
            .insert(versioned.value.reward_id.clone(), versioned.clone());
        Ok(versioned)
    }

    async fn commit(&self, tx: Transaction) -> Result<()> {
        let mut state = self.state.write();
        state.validate(&tx)?;
        state.apply(tx);
        Ok(())
    }
}
