//! 变更事件发布
//!
//! 事务提交成功后发布账户、库存、账本的变更事件，供展示层刷新余额与库存。
//! 传输方式由订阅方决定，这里只提供进程内广播。
//!
//! 发布失败（例如当前没有订阅者）只记录日志，不影响已提交的业务结果。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::RedemptionRecord;

/// 兑换引擎变更事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedemptionEvent {
    /// 兑换成功：积分已扣减、库存已减一、新增 PENDING 记录
    #[serde(rename_all = "camelCase")]
    Redeemed {
        record: RedemptionRecord,
        point_balance: i64,
        remaining_stock: i64,
    },
    /// 兑换已取消：积分已退还
    #[serde(rename_all = "camelCase")]
    Cancelled {
        redemption_id: Uuid,
        user_id: String,
        reward_id: String,
        refunded_points: i64,
        point_balance: i64,
        /// 开启库存回补时为回补后的库存
        restored_stock: Option<i64>,
        cancelled_at: DateTime<Utc>,
    },
    /// 兑换已核销
    #[serde(rename_all = "camelCase")]
    Completed {
        redemption_id: Uuid,
        user_id: String,
        completed_at: DateTime<Utc>,
    },
    /// 积分入账
    #[serde(rename_all = "camelCase")]
    PointsCredited {
        user_id: String,
        points: i64,
        point_balance: i64,
        reason: String,
    },
}

impl RedemptionEvent {
    /// 事件关联的用户
    pub fn user_id(&self) -> &str {
        match self {
            Self::Redeemed { record, .. } => &record.user_id,
            Self::Cancelled { user_id, .. }
            | Self::Completed { user_id, .. }
            | Self::PointsCredited { user_id, .. } => user_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Redeemed { .. } => "REDEEMED",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Completed { .. } => "COMPLETED",
            Self::PointsCredited { .. } => "POINTS_CREDITED",
        }
    }
}

/// 事件发布接口
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: RedemptionEvent);
}

/// 丢弃所有事件
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: RedemptionEvent) {}
}

/// 基于 tokio broadcast 的进程内发布器
///
/// 慢订阅者会丢失最旧的事件（Lagged），不会阻塞发布方。
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<RedemptionEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RedemptionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn into_shared(self) -> Arc<dyn EventPublisher> {
        Arc::new(self)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: RedemptionEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.sender.send(event) {
            debug!(event_type, error = %e, "没有事件订阅者，事件已丢弃");
        }
    }
}
