//! 服务层
//!
//! 实现兑换、取消、核销、积分入账等业务逻辑。每次调用对应一次乐观并发事务，
//! 冲突时在有限次数内整体重试。
//!
//! ## 模块结构
//!
//! - `redemption_service`: 兑换与取消
//! - `points_service`: 开户与积分入账
//! - `validation`: 入参校验

mod points_service;
mod redemption_service;
pub mod validation;

use std::future::Future;

use metrics::counter;
use parking_lot::Mutex;
use rewards_shared::retry::{RetryPolicy, retry_with_policy};

use crate::error::{RedemptionError, Result};
use crate::store::{RedemptionStore, Transaction};

pub use points_service::PointsService;
pub use redemption_service::{MAX_HISTORY_LIMIT, RedemptionService};

/// 在冲突重试策略下执行一次事务
///
/// 重试用尽后把存储层内部错误转换为对外错误：
/// - ConcurrencyConflict -> TransientConflict
/// - DuplicateCode -> CodeGenerationExhausted
///
/// StorageUnavailable 原样返回，业务错误第一次出现即返回。
pub(crate) async fn run_transaction<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts();
    let is_retryable = |err: &RedemptionError| {
        if matches!(err, RedemptionError::ConcurrencyConflict) {
            counter!("redemption_conflicts_total", "operation" => operation).increment(1);
        }
        err.is_retryable()
    };

    retry_with_policy(policy, operation, is_retryable, op)
        .await
        .map_err(|err| match err {
            RedemptionError::ConcurrencyConflict => RedemptionError::TransientConflict { attempts },
            RedemptionError::DuplicateCode(_) => {
                RedemptionError::CodeGenerationExhausted { attempts }
            }
            other => other,
        })
}

/// 结果未确认的提交
///
/// 提交请求发出后连接中断时（StorageUnavailable），事务可能已经生效。
/// 记录该次提交预期产生的结果，下一次尝试先核对存储中的实际状态，
/// 已生效则直接返回该结果，避免重复扣分或重复退款。
pub(crate) struct UnconfirmedCommit<T> {
    pending: Mutex<Option<T>>,
}

impl<T: Clone> UnconfirmedCommit<T> {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }

    /// 提交事务，连接类失败时保留 `outcome` 供下一次尝试核对
    pub(crate) async fn commit(
        &self,
        store: &dyn RedemptionStore,
        tx: Transaction,
        outcome: T,
    ) -> Result<()> {
        let result = store.commit(tx).await;
        *self.pending.lock() = match &result {
            Err(RedemptionError::StorageUnavailable(_)) => Some(outcome),
            _ => None,
        };
        result
    }

    /// 上一次提交结果未知时返回其预期结果
    pub(crate) fn pending(&self) -> Option<T> {
        self.pending.lock().clone()
    }
}
