use crate::domain::ports::KeyValueStore;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Deadline applied to every store operation.
const OP_DEADLINE: Duration = Duration::from_secs(3);
/// Deadline for the initial connection probe.
const CONNECT_DEADLINE: Duration = Duration::from_secs(5);

/// Typed adapter over the shared key/value store. Operations do not retry;
/// transient failures surface to the caller, which logs and moves on.
#[derive(Clone)]
pub struct KvStore {
    manager: ConnectionManager,
}

impl KvStore {
    /// Connects and verifies the server responds to PING within the
    /// connect deadline. A failed probe is a fatal startup error.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid kv store url")?;
        let manager = timeout(CONNECT_DEADLINE, ConnectionManager::new(client))
            .await
            .map_err(|_| anyhow!("kv store connection timed out"))?
            .context("kv store connection failed")?;

        let mut conn = manager.clone();
        let pong: String = timeout(CONNECT_DEADLINE, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| anyhow!("kv store ping timed out"))?
            .context("kv store ping failed")?;
        debug!(%pong, "kv store probe ok");
        info!(url, "kv store connected");

        Ok(Self { manager })
    }

    /// Serializes `value` as JSON and stores it under `key` with a TTL.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let payload = serde_json::to_string(value).context("payload serialization failed")?;
        self.set_with_ttl(key, payload, ttl).await
    }

    /// Reads and deserializes a JSON value; `None` when the key is absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("malformed JSON under '{key}'"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KeyValueStore for KvStore {
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        timeout(
            OP_DEADLINE,
            conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()),
        )
        .await
        .map_err(|_| anyhow!("SET '{key}' deadline exceeded"))?
        .with_context(|| format!("SET '{key}' failed"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = timeout(OP_DEADLINE, conn.get(key))
            .await
            .map_err(|_| anyhow!("GET '{key}' deadline exceeded"))?
            .with_context(|| format!("GET '{key}' failed"))?;
        Ok(value)
    }

    async fn list_head(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = timeout(OP_DEADLINE, conn.lindex(key, 0))
            .await
            .map_err(|_| anyhow!("LINDEX '{key}' deadline exceeded"))?
            .with_context(|| format!("LINDEX '{key}' failed"))?;
        Ok(value)
    }

    async fn push_trimmed(
        &self,
        key: &str,
        value: String,
        max_len: usize,
        replace_head: bool,
    ) -> Result<()> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        if replace_head {
            pipe.cmd("LPOP").arg(key).ignore();
        }
        pipe.lpush(key, value).ignore();
        let last = max_len.saturating_sub(1) as isize;
        pipe.ltrim(key, 0, last).ignore();

        timeout(OP_DEADLINE, pipe.query_async::<_, ()>(&mut conn))
            .await
            .map_err(|_| anyhow!("LPUSH+LTRIM '{key}' deadline exceeded"))?
            .with_context(|| format!("LPUSH+LTRIM '{key}' failed"))?;
        Ok(())
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let values: Vec<String> = timeout(OP_DEADLINE, conn.lrange(key, 0, -1))
            .await
            .map_err(|_| anyhow!("LRANGE '{key}' deadline exceeded"))?
            .with_context(|| format!("LRANGE '{key}' failed"))?;
        Ok(values)
    }

    async fn scan_delete(&self, pattern: &str) -> Result<u64> {
        // SCAN instead of KEYS: cursor iteration never blocks the server.
        let mut conn = self.manager.clone();
        let keys: Vec<String> = timeout(OP_DEADLINE, async {
            let mut found = Vec::new();
            let mut iter = conn.scan_match::<_, String>(pattern).await?;
            while let Some(key) = iter.next_item().await {
                found.push(key);
            }
            Ok::<_, redis::RedisError>(found)
        })
        .await
        .map_err(|_| anyhow!("SCAN '{pattern}' deadline exceeded"))?
        .with_context(|| format!("SCAN '{pattern}' failed"))?;

        if keys.is_empty() {
            return Ok(0);
        }
        let count = keys.len() as u64;
        let mut conn = self.manager.clone();
        timeout(OP_DEADLINE, conn.del::<_, ()>(keys))
            .await
            .map_err(|_| anyhow!("DEL for '{pattern}' deadline exceeded"))?
            .with_context(|| format!("DEL for '{pattern}' failed"))?;
        Ok(count)
    }
}
