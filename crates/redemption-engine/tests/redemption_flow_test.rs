//! 兑换流程集成测试
//!
//! 基于内存存储验证兑换、取消、核销的完整业务流程。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use rewards_redemption::code_generator::is_valid_code;
use rewards_redemption::{
    CodeGenerator, EntityKind, MemoryStore, RedemptionEngine, RedemptionError, RedemptionEvent,
    RedemptionStatus, RedemptionStore, RewardListing,
};
use rewards_shared::config::RedemptionConfig;
use rewards_shared::test_utils::test_redemption_config;
use uuid::Uuid;

/// 测试环境：内存存储 + 引擎
struct TestContext {
    store: Arc<MemoryStore>,
    engine: RedemptionEngine,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(test_redemption_config())
    }

    fn with_config(config: RedemptionConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine = RedemptionEngine::new(store.clone(), config);
        Self { store, engine }
    }

    async fn account_with(&self, user_id: &str, points: i64) {
        self.engine.points().open_account(user_id).await.unwrap();
        if points > 0 {
            self.engine
                .points()
                .credit(user_id, points, "seed")
                .await
                .unwrap();
        }
    }

    async fn reward(&self, reward_id: &str, cost: i64, stock: i64) {
        self.store
            .upsert_reward(RewardListing::new(reward_id, "测试奖品", cost, stock, Utc::now()))
            .await
            .unwrap();
    }

    async fn balance(&self, user_id: &str) -> i64 {
        self.engine.points().balance(user_id).await.unwrap()
    }

    async fn stock(&self, reward_id: &str) -> i64 {
        self.store
            .get_reward(reward_id)
            .await
            .unwrap()
            .unwrap()
            .value
            .stock
    }
}

/// 依次返回预设兑换码
struct SequenceCodes {
    codes: Vec<&'static str>,
    next: AtomicUsize,
}

impl CodeGenerator for SequenceCodes {
    fn generate(&self) -> String {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        self.codes[i.min(self.codes.len() - 1)].to_string()
    }
}

#[tokio::test]
async fn test_redeem_then_cancel_end_to_end() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;
    ctx.reward("r1", 30, 2).await;

    let record = ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap();

    assert_eq!(record.status, RedemptionStatus::Pending);
    assert_eq!(record.cost_snapshot, 30);
    assert!(is_valid_code(&record.code));
    assert_eq!(ctx.balance("user-1").await, 70);
    assert_eq!(ctx.stock("r1").await, 1);

    ctx.engine
        .redemptions()
        .cancel(record.id, "user-1")
        .await
        .unwrap();

    let cancelled = ctx
        .engine
        .redemptions()
        .get_redemption(record.id, "user-1")
        .await
        .unwrap();
    assert_eq!(cancelled.status, RedemptionStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(ctx.balance("user-1").await, 100);
    // 默认不回补库存
    assert_eq!(ctx.stock("r1").await, 1);
}

#[tokio::test]
async fn test_insufficient_points_writes_nothing() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 20).await;
    ctx.reward("r1", 30, 2).await;

    let err = ctx
        .engine
        .redemptions()
        .redeem("user-1", "r1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RedemptionError::InsufficientPoints {
            required: 30,
            available: 20
        }
    ));
    assert_eq!(ctx.balance("user-1").await, 20);
    assert_eq!(ctx.stock("r1").await, 2);
    assert_eq!(ctx.store.redemption_count(), 0);
}

#[tokio::test]
async fn test_out_of_stock_writes_nothing() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;
    ctx.reward("r1", 30, 0).await;

    let err = ctx
        .engine
        .redemptions()
        .redeem("user-1", "r1")
        .await
        .unwrap_err();

    assert!(matches!(err, RedemptionError::OutOfStock(ref id) if id == "r1"));
    assert_eq!(ctx.balance("user-1").await, 100);
    assert_eq!(ctx.store.redemption_count(), 0);
}

#[tokio::test]
async fn test_points_checked_before_stock() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 10).await;
    ctx.reward("r1", 30, 0).await;

    let err = ctx
        .engine
        .redemptions()
        .redeem("user-1", "r1")
        .await
        .unwrap_err();
    assert!(matches!(err, RedemptionError::InsufficientPoints { .. }));
}

#[tokio::test]
async fn test_redeem_exact_balance_and_last_item() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 30).await;
    ctx.reward("r1", 30, 1).await;

    ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap();

    assert_eq!(ctx.balance("user-1").await, 0);
    assert_eq!(ctx.stock("r1").await, 0);
}

#[tokio::test]
async fn test_redeem_unknown_entities() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;
    ctx.reward("r1", 30, 2).await;

    let err = ctx
        .engine
        .redemptions()
        .redeem("ghost", "r1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RedemptionError::RecordNotFound {
            entity: EntityKind::Account,
            ..
        }
    ));

    let err = ctx
        .engine
        .redemptions()
        .redeem("user-1", "missing")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RedemptionError::RecordNotFound {
            entity: EntityKind::Reward,
            ..
        }
    ));
    assert_eq!(ctx.balance("user-1").await, 100);
}

#[tokio::test]
async fn test_redeem_rejects_malformed_ids() {
    let ctx = TestContext::new();
    for (user_id, reward_id) in [("", "r1"), ("user-1", ""), ("user 1", "r1"), ("user-1", "r\n1")] {
        let err = ctx
            .engine
            .redemptions()
            .redeem(user_id, reward_id)
            .await
            .unwrap_err();
        assert!(matches!(err, RedemptionError::Validation(_)));
    }
}

#[tokio::test]
async fn test_cost_snapshot_survives_price_change() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;
    ctx.reward("r1", 30, 5).await;

    let record = ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap();

    // 奖品调价后取消，退还的是兑换时的价格
    ctx.reward("r1", 50, 5).await;
    ctx.engine
        .redemptions()
        .cancel(record.id, "user-1")
        .await
        .unwrap();

    assert_eq!(ctx.balance("user-1").await, 100);
}

#[tokio::test]
async fn test_double_cancel_refunds_once() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;
    ctx.reward("r1", 30, 2).await;

    let record = ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap();
    ctx.engine
        .redemptions()
        .cancel(record.id, "user-1")
        .await
        .unwrap();

    let err = ctx
        .engine
        .redemptions()
        .cancel(record.id, "user-1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RedemptionError::InvalidStateTransition {
            from: RedemptionStatus::Cancelled,
            to: RedemptionStatus::Cancelled,
            ..
        }
    ));
    assert_eq!(ctx.balance("user-1").await, 100);
}

#[tokio::test]
async fn test_cancel_by_other_user_is_unauthorized() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;
    ctx.account_with("user-2", 0).await;
    ctx.reward("r1", 30, 2).await;

    let record = ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap();

    let err = ctx
        .engine
        .redemptions()
        .cancel(record.id, "user-2")
        .await
        .unwrap_err();
    assert!(matches!(err, RedemptionError::Unauthorized { redemption_id } if redemption_id == record.id));

    let unchanged = ctx
        .engine
        .redemptions()
        .get_redemption(record.id, "user-1")
        .await
        .unwrap();
    assert_eq!(unchanged.status, RedemptionStatus::Pending);
    assert_eq!(ctx.balance("user-1").await, 70);
    assert_eq!(ctx.balance("user-2").await, 0);
}

#[tokio::test]
async fn test_cancel_unknown_redemption() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;

    let err = ctx
        .engine
        .redemptions()
        .cancel(Uuid::now_v7(), "user-1")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RedemptionError::RecordNotFound {
            entity: EntityKind::Redemption,
            ..
        }
    ));
}

#[tokio::test]
async fn test_completed_redemption_cannot_be_cancelled() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;
    ctx.reward("r1", 30, 2).await;

    let record = ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap();
    let completed = ctx.engine.redemptions().complete(record.id).await.unwrap();
    assert_eq!(completed.status, RedemptionStatus::Completed);
    assert!(completed.completed_at.is_some());

    let err = ctx
        .engine
        .redemptions()
        .cancel(record.id, "user-1")
        .await
        .unwrap_err();
    assert!(matches!(err, RedemptionError::InvalidStateTransition { .. }));
    assert_eq!(ctx.balance("user-1").await, 70);

    // 终态不可再次核销
    assert!(matches!(
        ctx.engine.redemptions().complete(record.id).await,
        Err(RedemptionError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn test_restore_stock_on_cancel_policy() {
    let ctx = TestContext::with_config(RedemptionConfig {
        restore_stock_on_cancel: true,
        ..test_redemption_config()
    });
    ctx.account_with("user-1", 100).await;
    ctx.reward("r1", 30, 1).await;

    let record = ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap();
    assert_eq!(ctx.stock("r1").await, 0);

    ctx.engine
        .redemptions()
        .cancel(record.id, "user-1")
        .await
        .unwrap();

    assert_eq!(ctx.stock("r1").await, 1);
    assert_eq!(ctx.balance("user-1").await, 100);
}

#[tokio::test]
async fn test_code_collision_retries_with_new_code() {
    let store = Arc::new(MemoryStore::new());
    let engine = RedemptionEngine::with_code_generator(
        store.clone(),
        Arc::new(SequenceCodes {
            codes: vec!["AAAA1111", "AAAA1111", "BBBB2222"],
            next: AtomicUsize::new(0),
        }),
        test_redemption_config(),
    );
    engine.points().open_account("user-1").await.unwrap();
    engine.points().credit("user-1", 100, "seed").await.unwrap();
    store
        .upsert_reward(RewardListing::new("r1", "水杯", 10, 5, Utc::now()))
        .await
        .unwrap();

    let first = engine.redemptions().redeem("user-1", "r1").await.unwrap();
    let second = engine.redemptions().redeem("user-1", "r1").await.unwrap();

    assert_eq!(first.code, "AAAA1111");
    assert_eq!(second.code, "BBBB2222");
}

#[tokio::test]
async fn test_code_generation_exhausted() {
    let store = Arc::new(MemoryStore::new());
    let engine = RedemptionEngine::with_code_generator(
        store.clone(),
        Arc::new(SequenceCodes {
            codes: vec!["AAAA1111"],
            next: AtomicUsize::new(0),
        }),
        test_redemption_config(),
    );
    engine.points().open_account("user-1").await.unwrap();
    engine.points().credit("user-1", 100, "seed").await.unwrap();
    store
        .upsert_reward(RewardListing::new("r1", "水杯", 10, 5, Utc::now()))
        .await
        .unwrap();

    engine.redemptions().redeem("user-1", "r1").await.unwrap();
    let err = engine.redemptions().redeem("user-1", "r1").await.unwrap_err();

    assert!(matches!(err, RedemptionError::CodeGenerationExhausted { .. }));
    assert_eq!(engine.points().balance("user-1").await.unwrap(), 90);
    assert_eq!(store.redemption_count(), 1);
}

#[tokio::test]
async fn test_history_is_newest_first_and_scoped_to_user() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;
    ctx.account_with("user-2", 100).await;
    ctx.reward("r1", 10, 10).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap().id);
    }
    ctx.engine.redemptions().redeem("user-2", "r1").await.unwrap();

    let history = ctx
        .engine
        .redemptions()
        .list_user_redemptions("user-1", 10)
        .await
        .unwrap();

    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.user_id == "user-1"));
    ids.reverse();
    assert_eq!(history.iter().map(|r| r.id).collect::<Vec<_>>(), ids);
}

#[tokio::test]
async fn test_get_redemption_of_other_user_is_unauthorized() {
    let ctx = TestContext::new();
    ctx.account_with("user-1", 100).await;
    ctx.reward("r1", 10, 10).await;

    let record = ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap();
    assert!(matches!(
        ctx.engine.redemptions().get_redemption(record.id, "user-2").await,
        Err(RedemptionError::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn test_events_published_after_commit() {
    let ctx = TestContext::new();
    let mut events = ctx.engine.subscribe();

    ctx.account_with("user-1", 100).await;
    ctx.reward("r1", 30, 2).await;

    let record = ctx.engine.redemptions().redeem("user-1", "r1").await.unwrap();
    ctx.engine
        .redemptions()
        .cancel(record.id, "user-1")
        .await
        .unwrap();

    // 失败的兑换不发布事件
    let _ = ctx.engine.redemptions().redeem("user-1", "missing").await;

    match events.recv().await.unwrap() {
        RedemptionEvent::PointsCredited { point_balance, .. } => assert_eq!(point_balance, 100),
        other => panic!("unexpected event: {:?}", other),
    }
    match events.recv().await.unwrap() {
        RedemptionEvent::Redeemed {
            record: redeemed,
            point_balance,
            remaining_stock,
        } => {
            assert_eq!(redeemed.id, record.id);
            assert_eq!(point_balance, 70);
            assert_eq!(remaining_stock, 1);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    match events.recv().await.unwrap() {
        RedemptionEvent::Cancelled {
            redemption_id,
            refunded_points,
            point_balance,
            restored_stock,
            ..
        } => {
            assert_eq!(redemption_id, record.id);
            assert_eq!(refunded_points, 30);
            assert_eq!(point_balance, 100);
            assert_eq!(restored_stock, None);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(events.try_recv().is_err());
}
