//! Outcome logging collaborator.
//!
//! Writes are fire-and-forget: `dispatch` detaches the write and only logs a
//! failure for operators. A failed write never reaches the round.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use argus_common::OutcomeRecord;
use argus_common::constants::redis_keys;

/// Destination for graded attempts
pub trait OutcomeSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn record(&self, record: OutcomeRecord) -> BoxFuture<'_, Result<()>>;
}

/// Appends JSON records to a Redis list
pub struct RedisOutcomeSink {
    redis: ConnectionManager,
}

impl RedisOutcomeSink {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { redis })
    }
}

impl OutcomeSink for RedisOutcomeSink {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn record(&self, record: OutcomeRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let value = serde_json::to_string(&record)?;
            let mut conn = self.redis.clone();
            conn.lpush::<_, _, ()>(redis_keys::OUTCOMES, value)
                .await
                .context("Failed to push outcome")?;
            Ok::<(), anyhow::Error>(())
        })
    }
}

/// Emits each record as a log event
pub struct LogOutcomeSink;

impl OutcomeSink for LogOutcomeSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn record(&self, record: OutcomeRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            tracing::info!(
                kind = %record.kind,
                success = record.success,
                device = ?record.device,
                timestamp = %record.timestamp,
                "Challenge outcome"
            );
            Ok::<(), anyhow::Error>(())
        })
    }
}

/// Detach the write; failures are logged and dropped
pub fn dispatch(sink: &Arc<dyn OutcomeSink>, record: OutcomeRecord) {
    let sink = sink.clone();
    tokio::spawn(async move {
        if let Err(e) = sink.record(record).await {
            tracing::warn!(sink = sink.name(), error = %e, "Outcome log write failed");
        }
    });
}
