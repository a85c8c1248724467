//! 服务装配
//!
//! 以同一个存储和同一个事件广播器组装兑换服务与积分服务。

use std::sync::Arc;

use rewards_shared::config::RedemptionConfig;
use tokio::sync::broadcast;

use crate::code_generator::{CodeGenerator, RandomCodeGenerator};
use crate::events::{BroadcastPublisher, EventPublisher, RedemptionEvent};
use crate::service::{PointsService, RedemptionService};
use crate::store::RedemptionStore;

/// 兑换引擎
pub struct RedemptionEngine {
    redemptions: RedemptionService,
    points: PointsService,
    publisher: BroadcastPublisher,
}

impl RedemptionEngine {
    pub fn new(store: Arc<dyn RedemptionStore>, config: RedemptionConfig) -> Self {
        Self::with_code_generator(store, Arc::new(RandomCodeGenerator), config)
    }

    pub fn with_code_generator(
        store: Arc<dyn RedemptionStore>,
        code_generator: Arc<dyn CodeGenerator>,
        config: RedemptionConfig,
    ) -> Self {
        let publisher = BroadcastPublisher::new(config.event_buffer);
        let shared: Arc<dyn EventPublisher> = publisher.clone().into_shared();

        let points = PointsService::new(store.clone(), shared.clone(), config.retry_policy());
        let redemptions = RedemptionService::new(store, code_generator, shared, config);

        Self {
            redemptions,
            points,
            publisher,
        }
    }

    pub fn redemptions(&self) -> &RedemptionService {
        &self.redemptions
    }

    pub fn points(&self) -> &PointsService {
        &self.points
    }

    /// 订阅提交后的变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<RedemptionEvent> {
        self.publisher.subscribe()
    }
}
