//! 领域模型
//!
//! 包含积分账户、奖品目录、兑换记录三类实体，以及实体类型标识。

mod account;
mod redemption;
mod reward;

use serde::{Deserialize, Serialize};

pub use account::UserAccount;
pub use redemption::{RedemptionRecord, RedemptionStatus};
pub use reward::RewardListing;

/// 实体类型
///
/// 用于错误信息与事务读写集中的实体定位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Account,
    Reward,
    Redemption,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Account => "account",
            Self::Reward => "reward",
            Self::Redemption => "redemption",
        };
        write!(f, "{}", s)
    }
}
