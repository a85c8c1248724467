//! 乐观并发事务
//!
//! 事务在本地收集读集（实体及其快照版本）与写集（待写入的新值），
//! 由存储层在提交时一次性校验版本并应用全部写入。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EntityKind, RedemptionRecord, RewardListing, UserAccount};

/// 带版本号的快照
///
/// 版本号在每次成功提交写入后加一，新插入的实体版本为 1。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }

    pub fn initial(value: T) -> Self {
        Self { value, version: 1 }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// 实体主键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Account(String),
    Reward(String),
    Redemption(Uuid),
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Account(_) => EntityKind::Account,
            Self::Reward(_) => EntityKind::Reward,
            Self::Redemption(_) => EntityKind::Redemption,
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Account(id) => write!(f, "account:{}", id),
            Self::Reward(id) => write!(f, "reward:{}", id),
            Self::Redemption(id) => write!(f, "redemption:{}", id),
        }
    }
}

/// 可在事务中定位的实体
pub trait Keyed {
    fn entity_key(&self) -> EntityKey;
}

impl Keyed for UserAccount {
    fn entity_key(&self) -> EntityKey {
        EntityKey::Account(self.user_id.clone())
    }
}

impl Keyed for RewardListing {
    fn entity_key(&self) -> EntityKey {
        EntityKey::Reward(self.reward_id.clone())
    }
}

impl Keyed for RedemptionRecord {
    fn entity_key(&self) -> EntityKey {
        EntityKey::Redemption(self.id)
    }
}

/// 事务写入项
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    PutAccount(UserAccount),
    PutReward(RewardListing),
    InsertRedemption(RedemptionRecord),
    PutRedemption(RedemptionRecord),
}

impl Mutation {
    pub fn entity_key(&self) -> EntityKey {
        match self {
            Self::PutAccount(account) => account.entity_key(),
            Self::PutReward(reward) => reward.entity_key(),
            Self::InsertRedemption(record) | Self::PutRedemption(record) => record.entity_key(),
        }
    }
}

/// 乐观并发事务
///
/// 更新已有实体前必须先通过 `read` 登记其快照版本，存储层据此检测写写冲突；
/// 只有新插入的兑换记录不需要读集条目。
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    reads: HashMap<EntityKey, u64>,
    mutations: Vec<Mutation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记读快照
    pub fn read<T: Keyed>(&mut self, snapshot: &Versioned<T>) -> &mut Self {
        self.reads
            .insert(snapshot.value.entity_key(), snapshot.version);
        self
    }

    pub fn put_account(&mut self, account: UserAccount) -> &mut Self {
        self.mutations.push(Mutation::PutAccount(account));
        self
    }

    pub fn put_reward(&mut self, reward: RewardListing) -> &mut Self {
        self.mutations.push(Mutation::PutReward(reward));
        self
    }

    pub fn insert_redemption(&mut self, record: RedemptionRecord) -> &mut Self {
        self.mutations.push(Mutation::InsertRedemption(record));
        self
    }

    pub fn put_redemption(&mut self, record: RedemptionRecord) -> &mut Self {
        self.mutations.push(Mutation::PutRedemption(record));
        self
    }

    /// 读集中记录的快照版本
    pub fn expected_version(&self, key: &EntityKey) -> Option<u64> {
        self.reads.get(key).copied()
    }

    pub fn reads(&self) -> impl Iterator<Item = (&EntityKey, u64)> {
        self.reads.iter().map(|(key, version)| (key, *version))
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// 仅读取、未写入的实体
    pub fn read_only_keys(&self) -> Vec<(&EntityKey, u64)> {
        self.reads()
            .filter(|(key, _)| !self.mutations.iter().any(|m| &m.entity_key() == *key))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}
