use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use serde::Serialize;
use tracing::debug;
use treasury_core::{ChangeNotifier, Invalidation};

pub const INVALIDATION_CHANNEL: &str = "treasury.invalidate";

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let receivers: i64 = connection.publish(channel, serialized).await?;
        debug!(channel, receivers, "published");
        Ok(())
    }
}

#[async_trait]
impl ChangeNotifier for RedisBus {
    async fn notify(&self, invalidation: &Invalidation) -> Result<()> {
        self.publish_json(INVALIDATION_CHANNEL, invalidation).await
    }
}
