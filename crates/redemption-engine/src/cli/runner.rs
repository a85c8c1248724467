//! 命令执行器
//!
//! 将子命令分派到兑换引擎，结果以 JSON 返回，由入口打印到标准输出。

use serde_json::{Value, json};
use tracing::info;

use super::commands::Commands;
use crate::engine::RedemptionEngine;
use crate::error::{RedemptionError, Result};

/// 命令执行器
pub struct CommandRunner {
    engine: RedemptionEngine,
}

impl CommandRunner {
    pub fn new(engine: RedemptionEngine) -> Self {
        Self { engine }
    }

    /// 执行业务子命令
    ///
    /// `migrate` 由入口在建立数据库连接后单独处理。
    pub async fn run(&self, command: Commands) -> Result<Value> {
        info!(?command, "执行命令");

        let output = match command {
            Commands::Migrate => {
                return Err(RedemptionError::Internal(
                    "migrate 需要在入口处执行".to_string(),
                ));
            }
            Commands::OpenAccount { user_id } => {
                json!(self.engine.points().open_account(&user_id).await?)
            }
            Commands::Balance { user_id } => {
                let balance = self.engine.points().balance(&user_id).await?;
                json!({ "userId": user_id, "pointBalance": balance })
            }
            Commands::Credit {
                user_id,
                points,
                reason,
            } => json!(self.engine.points().credit(&user_id, points, &reason).await?),
            Commands::Redeem { user_id, reward_id } => {
                json!(self.engine.redemptions().redeem(&user_id, &reward_id).await?)
            }
            Commands::Cancel {
                redemption_id,
                user_id,
            } => {
                self.engine
                    .redemptions()
                    .cancel(redemption_id, &user_id)
                    .await?;
                json!({ "redemptionId": redemption_id, "status": "CANCELLED" })
            }
            Commands::Complete { redemption_id } => {
                json!(self.engine.redemptions().complete(redemption_id).await?)
            }
            Commands::History { user_id, limit } => {
                json!(
                    self.engine
                        .redemptions()
                        .list_user_redemptions(&user_id, limit)
                        .await?
                )
            }
        };

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RewardListing;
    use crate::store::{MemoryStore, RedemptionStore};
    use chrono::Utc;
    use rewards_shared::config::RedemptionConfig;
    use std::sync::Arc;

    async fn runner() -> CommandRunner {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_reward(RewardListing::new("r1", "水杯", 30, 2, Utc::now()))
            .await
            .unwrap();
        CommandRunner::new(RedemptionEngine::new(store, RedemptionConfig::default()))
    }

    #[tokio::test]
    async fn test_redeem_and_history_via_runner() {
        let runner = runner().await;
        runner
            .run(Commands::OpenAccount {
                user_id: "user-1".to_string(),
            })
            .await
            .unwrap();
        runner
            .run(Commands::Credit {
                user_id: "user-1".to_string(),
                points: 100,
                reason: "manual".to_string(),
            })
            .await
            .unwrap();

        let redeemed = runner
            .run(Commands::Redeem {
                user_id: "user-1".to_string(),
                reward_id: "r1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(redeemed["status"], "PENDING");
        assert_eq!(redeemed["costSnapshot"], 30);

        let balance = runner
            .run(Commands::Balance {
                user_id: "user-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(balance["pointBalance"], 70);

        let history = runner
            .run(Commands::History {
                user_id: "user-1".to_string(),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(history.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_migrate_is_rejected_by_runner() {
        let runner = runner().await;
        assert!(runner.run(Commands::Migrate).await.is_err());
    }
}
