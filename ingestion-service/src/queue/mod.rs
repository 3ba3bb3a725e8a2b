//! Durable work queue with at-least-once delivery.
//!
//! A received message stays in the consumer's in-flight set until it is
//! acked, nacked or dead-lettered. A consumer processes one message at a
//! time, so it never holds more than one unacknowledged delivery.

mod memory;
mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue transport unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed queue envelope: {0}")]
    Malformed(String),

    #[error("Failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One delivery of a message. `attempt` starts at 1 and grows with every
/// requeue or crash recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub attempt: u32,
    pub payload: Vec<u8>,
    /// Transport handle used to settle this delivery.
    pub receipt: String,
}

/// Wire form of a queued message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Envelope {
    id: String,
    attempt: u32,
    body: String,
}

impl Envelope {
    pub(crate) fn new(payload: &[u8]) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            attempt: 1,
            body: BASE64.encode(payload),
        }
    }

    pub(crate) fn encode(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn decode(raw: &str) -> Result<Self, QueueError> {
        serde_json::from_str(raw).map_err(|e| QueueError::Malformed(e.to_string()))
    }

    pub(crate) fn redelivered(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }

    pub(crate) fn into_delivery(self, receipt: String) -> Result<Delivery, QueueError> {
        let payload = BASE64
            .decode(self.body.as_bytes())
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        Ok(Delivery {
            message_id: self.id,
            attempt: self.attempt,
            payload,
            receipt,
        })
    }
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError>;

    /// Wait up to `wait` for the next message and move it in-flight.
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Release an in-flight delivery. With `requeue` it goes back to the
    /// front of the queue with its attempt bumped; otherwise it is dropped.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError>;

    /// Requeue whatever a previous run of this consumer left in-flight.
    async fn recover_in_flight(&self) -> Result<usize, QueueError>;
}

/// Outcome of a handler failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Retry(pub String);

#[async_trait]
pub trait TaskHandler<T>: Send + Sync {
    /// `Ok` acks the delivery. `Err` asks for redelivery.
    async fn handle(&self, task: T, attempt: u32) -> Result<(), Retry>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    Requeued,
    DeadLettered,
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub max_deliveries: u32,
    pub receive_timeout: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            max_deliveries: 5,
            receive_timeout: Duration::from_secs(5),
        }
    }
}

/// Typed view of a transport: JSON task bodies in, handler dispatch out.
pub struct WorkQueue<T> {
    transport: Arc<dyn QueueTransport>,
    settings: ConsumerSettings,
    _task: PhantomData<fn() -> T>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            settings: self.settings.clone(),
            _task: PhantomData,
        }
    }
}

impl<T> WorkQueue<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(transport: Arc<dyn QueueTransport>, settings: ConsumerSettings) -> Self {
        Self {
            transport,
            settings,
            _task: PhantomData,
        }
    }

    pub fn transport(&self) -> &Arc<dyn QueueTransport> {
        &self.transport
    }

    pub async fn publish(&self, task: &T) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(task)?;
        self.transport.publish(payload).await
    }

    pub async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        self.transport.recover_in_flight().await
    }

    /// Receive and dispatch at most one message.
    pub async fn process_next<H>(&self, handler: &H) -> Result<Option<Disposition>, QueueError>
    where
        H: TaskHandler<T> + ?Sized,
    {
        match self.transport.receive(self.settings.receive_timeout).await? {
            Some(delivery) => self.dispatch(handler, delivery).await.map(Some),
            None => Ok(None),
        }
    }

    /// Consume until `shutdown` fires. Cancellation is only observed while
    /// waiting for a message, never mid-task.
    pub async fn consume<H>(&self, handler: &H, shutdown: CancellationToken)
    where
        H: TaskHandler<T> + ?Sized,
    {
        let mut backoff = ExponentialBackoff {
            max_interval: Duration::from_secs(30),
            max_elapsed_time: None,
            ..Default::default()
        };

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.transport.receive(self.settings.receive_timeout) => received,
            };

            match received {
                Ok(Some(delivery)) => {
                    backoff.reset();
                    if let Err(e) = self.dispatch(handler, delivery).await {
                        tracing::error!(error = %e, "Failed to settle delivery");
                    }
                }
                Ok(None) => backoff.reset(),
                Err(e) => {
                    let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
                    tracing::warn!(
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Queue receive failed, backing off"
                    );
                    metrics::counter!("queue_receive_errors_total").increment(1);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!("Queue consumer stopped");
    }

    async fn dispatch<H>(&self, handler: &H, delivery: Delivery) -> Result<Disposition, QueueError>
    where
        H: TaskHandler<T> + ?Sized,
    {
        let task: T = match serde_json::from_slice(&delivery.payload) {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(
                    message_id = %delivery.message_id,
                    error = %e,
                    "Undecodable task body, dead-lettering"
                );
                self.transport
                    .dead_letter(&delivery, &format!("undecodable task: {}", e))
                    .await?;
                metrics::counter!("queue_dead_lettered_total").increment(1);
                return Ok(Disposition::DeadLettered);
            }
        };

        match handler.handle(task, delivery.attempt).await {
            Ok(()) => {
                self.transport.ack(&delivery).await?;
                Ok(Disposition::Acked)
            }
            Err(retry) if delivery.attempt >= self.settings.max_deliveries => {
                tracing::error!(
                    message_id = %delivery.message_id,
                    attempt = delivery.attempt,
                    reason = %retry,
                    "Delivery limit reached, dead-lettering"
                );
                self.transport.dead_letter(&delivery, &retry.0).await?;
                metrics::counter!("queue_dead_lettered_total").increment(1);
                Ok(Disposition::DeadLettered)
            }
            Err(retry) => {
                tracing::warn!(
                    message_id = %delivery.message_id,
                    attempt = delivery.attempt,
                    reason = %retry,
                    "Requeueing delivery"
                );
                self.transport.nack(&delivery, true).await?;
                metrics::counter!("queue_requeued_total").increment(1);
                Ok(Disposition::Requeued)
            }
        }
    }
}
