use crate::domain::ports::EventBus;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

const OP_DEADLINE: Duration = Duration::from_secs(3);

/// Pub/sub adapter over the shared store's channel layer. Publishing is
/// best-effort; subscribers receive raw JSON payloads.
#[derive(Clone)]
pub struct MessageBus {
    client: redis::Client,
    manager: ConnectionManager,
}

impl MessageBus {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid bus url")?;
        let manager = timeout(OP_DEADLINE, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| anyhow!("bus connection timed out"))?
            .context("bus connection failed")?;
        info!(url, "message bus connected");
        Ok(Self { client, manager })
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value).context("payload serialization failed")?;
        self.publish(channel, payload).await
    }

    /// Opens a dedicated subscriber connection for `channel` and returns the
    /// stream of raw payloads.
    pub async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .context("bus subscriber connection failed")?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .with_context(|| format!("SUBSCRIBE '{channel}' failed"))?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
        Ok(stream.boxed())
    }
}

#[async_trait]
impl EventBus for MessageBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        let mut conn = self.manager.clone();
        timeout(OP_DEADLINE, conn.publish::<_, _, i64>(channel, payload))
            .await
            .map_err(|_| anyhow!("PUBLISH '{channel}' deadline exceeded"))?
            .with_context(|| format!("PUBLISH '{channel}' failed"))?;
        Ok(())
    }
}
