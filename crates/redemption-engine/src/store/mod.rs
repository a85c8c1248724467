//! 事务性存储层
//!
//! 以带版本号的记录加上统一的提交函数实现乐观并发控制：读取一致快照，
//! 在本地计算新值，提交时校验所有读集版本未被他人修改，否则整体拒绝。
//!
//! ## 设计原则
//!
//! - 存储只负责持久化与版本校验，不包含业务规则
//! - 提交是全有或全无的，失败时不留下任何部分写入
//! - 不跨调用持有任何锁
//! - 定义 trait 接口以支持内存实现、PostgreSQL 实现与 mock 测试

mod memory;
mod postgres;
mod transaction;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{RedemptionRecord, RewardListing, UserAccount};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use transaction::{EntityKey, Keyed, Mutation, Transaction, Versioned};

/// 兑换存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RedemptionStore: Send + Sync {
    // 快照读取
    async fn get_account(&self, user_id: &str) -> Result<Option<Versioned<UserAccount>>>;
    async fn get_reward(&self, reward_id: &str) -> Result<Option<Versioned<RewardListing>>>;
    async fn get_redemption(&self, id: Uuid) -> Result<Option<Versioned<RedemptionRecord>>>;

    // 账本查询
    async fn list_redemptions_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RedemptionRecord>>;
    async fn code_exists(&self, code: &str) -> Result<bool>;

    // 外部协作方写入（注册开户、目录维护）
    async fn insert_account_if_absent(
        &self,
        account: UserAccount,
    ) -> Result<Versioned<UserAccount>>;
    async fn upsert_reward(&self, reward: RewardListing) -> Result<Versioned<RewardListing>>;

    /// 提交事务
    ///
    /// - 读集中任一实体版本已变化：返回 ConcurrencyConflict，不写入任何数据
    /// - 新兑换记录的兑换码已存在：返回 DuplicateCode，不写入任何数据
    async fn commit(&self, tx: Transaction) -> Result<()>;
}
