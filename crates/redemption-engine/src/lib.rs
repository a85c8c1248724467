//! 积分兑换引擎
//!
//! 用户用积分兑换奖品目录中的物品，并可在领取前取消以退还积分。
//!
//! ## 核心功能
//!
//! - **兑换**：原子地扣减积分、扣减库存、写入兑换记录并签发兑换码
//! - **取消**：将待领取记录置为已取消并退还积分，防止重复退款
//! - **核销**：线下领取后将记录置为已完成
//! - **积分入账**：外部积分发放流程与兑换共用同一并发控制
//! - **变更通知**：提交成功后广播余额、库存、账本变化
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `code_generator`: 兑换码生成
//! - `store`: 乐观并发存储（内存 / PostgreSQL）
//! - `events`: 变更事件发布
//! - `service`: 业务服务层
//! - `engine`: 服务装配
//! - `cli`: 命令行工具

pub mod cli;
pub mod code_generator;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod service;
pub mod store;

pub use code_generator::{CodeGenerator, RandomCodeGenerator};
pub use engine::RedemptionEngine;
pub use error::{RedemptionError, Result};
pub use events::{BroadcastPublisher, EventPublisher, NoopPublisher, RedemptionEvent};
pub use models::*;
pub use service::{PointsService, RedemptionService};
pub use store::{MemoryStore, PgStore, RedemptionStore, Transaction, Versioned};
