//! Redis-backed Processing Lease and Execution Queue. Kept alongside the
//! Postgres store in this crate since the orchestrator has one external
//! adapter crate per protocol count, not per table.

use async_trait::async_trait;
use redis::AsyncCommands;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::ports::{LeaseStore, Queue};

pub struct RedisLeaseStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisLeaseStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(RedisLeaseStore { manager })
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn acquire(&self, key: &str, holder: &str, ttl: std::time::Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| OrchestratorError::LeaseStore(e.into()))?;
        Ok(result.is_some())
    }

    async fn release(&self, key: &str, holder: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        // Compare-and-delete via a small Lua script so we only release our
        // own lease, never one acquired by a different holder after expiry.
        const SCRIPT: &str = r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#;
        redis::Script::new(SCRIPT)
            .key(key)
            .arg(holder)
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| OrchestratorError::LeaseStore(e.into()))?;
        Ok(())
    }
}

pub struct RedisQueue {
    manager: redis::aio::ConnectionManager,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(RedisQueue { manager })
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn push(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .rpush(topic, payload)
            .await
            .map_err(|e| OrchestratorError::LeaseStore(e.into()))?;
        Ok(())
    }

    async fn pop(&self, topic: &str, timeout: std::time::Duration) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let result: Option<(String, Vec<u8>)> = conn
            .blpop(topic, timeout.as_secs_f64())
            .await
            .map_err(|e| OrchestratorError::LeaseStore(e.into()))?;
        Ok(result.map(|(_, payload)| payload))
    }
}
