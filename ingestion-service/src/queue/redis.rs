use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::ConnectionManager, Client};
use std::time::Duration;

use super::{Delivery, Envelope, QueueError, QueueTransport};

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

/// Redis list-backed queue.
///
/// Producers `LPUSH` onto `<queue>`; consumers `BLMOVE` from its tail into
/// their own `<queue>:processing:<consumer>` list, which is what survives a
/// crash. Each consumer needs its own connection since `BLMOVE` blocks it.
#[derive(Clone)]
pub struct RedisQueue {
    manager: ConnectionManager,
    ready_key: String,
    in_flight_key: String,
    dead_key: String,
}

impl RedisQueue {
    pub async fn connect(url: &str, queue: &str, consumer: &str) -> Result<Self, QueueError> {
        tracing::info!(queue = %queue, consumer = %consumer, "Connecting queue to Redis");
        let client = Client::open(url)?;
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            QueueError::from(e)
        })?;
        Ok(Self::from_manager(manager, queue, consumer))
    }

    pub fn from_manager(manager: ConnectionManager, queue: &str, consumer: &str) -> Self {
        Self {
            manager,
            ready_key: queue.to_string(),
            in_flight_key: format!("{}:processing:{}", queue, consumer),
            dead_key: format!("{}:dead", queue),
        }
    }

    fn dead_entry(raw: &str, reason: &str) -> String {
        serde_json::json!({
            "envelope": raw,
            "reason": reason,
            "dead_at": Utc::now().to_rfc3339(),
        })
        .to_string()
    }
}

#[async_trait]
impl QueueTransport for RedisQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let raw = Envelope::new(&payload).encode()?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.ready_key)
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.ready_key)
            .arg(&self.in_flight_key)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64().max(0.01))
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match Envelope::decode(&raw).and_then(|envelope| envelope.into_delivery(raw.clone())) {
            Ok(delivery) => Ok(Some(delivery)),
            Err(e) => {
                tracing::error!(error = %e, "Dropping malformed envelope to dead-letter list");
                let _: () = redis::pipe()
                    .atomic()
                    .cmd("LREM")
                    .arg(&self.in_flight_key)
                    .arg(1)
                    .arg(&raw)
                    .ignore()
                    .cmd("LPUSH")
                    .arg(&self.dead_key)
                    .arg(Self::dead_entry(&raw, &e.to_string()))
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("LREM")
            .arg(&self.in_flight_key)
            .arg(1)
            .arg(&delivery.receipt)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LREM")
            .arg(&self.in_flight_key)
            .arg(1)
            .arg(&delivery.receipt)
            .ignore();
        if requeue {
            let next = Envelope::decode(&delivery.receipt)?.redelivered().encode()?;
            // RPUSH puts it at the tail, which is the next one BLMOVE takes.
            pipe.cmd("RPUSH").arg(&self.ready_key).arg(next).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.in_flight_key)
            .arg(1)
            .arg(&delivery.receipt)
            .ignore()
            .cmd("LPUSH")
            .arg(&self.dead_key)
            .arg(Self::dead_entry(&delivery.receipt, reason))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut conn = self.manager.clone();
        let stranded: Vec<String> = redis::cmd("LRANGE")
            .arg(&self.in_flight_key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        for raw in &stranded {
            let mut pipe = redis::pipe();
            pipe.atomic()
                .cmd("LREM")
                .arg(&self.in_flight_key)
                .arg(1)
                .arg(raw)
                .ignore();
            match Envelope::decode(raw).and_then(|e| e.redelivered().encode()) {
                Ok(next) => pipe.cmd("RPUSH").arg(&self.ready_key).arg(next).ignore(),
                Err(e) => pipe
                    .cmd("LPUSH")
                    .arg(&self.dead_key)
                    .arg(Self::dead_entry(raw, &e.to_string()))
                    .ignore(),
            };
            let _: () = pipe.query_async(&mut conn).await?;
        }

        if !stranded.is_empty() {
            tracing::warn!(
                count = stranded.len(),
                in_flight = %self.in_flight_key,
                "Recovered in-flight deliveries from a previous run"
            );
        }
        Ok(stranded.len())
    }
}
