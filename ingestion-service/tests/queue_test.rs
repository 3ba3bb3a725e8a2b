use async_trait::async_trait;
use ingestion_service::queue::{
    ConsumerSettings, Disposition, MemoryQueue, QueueTransport, Retry, TaskHandler, WorkQueue,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ping {
    n: u32,
}

/// Fails the first `failures` deliveries, then succeeds. Records every
/// `(n, attempt)` it sees.
struct Flaky {
    failures: u32,
    seen: Mutex<Vec<(u32, u32)>>,
}

impl Flaky {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<(u32, u32)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler<Ping> for Flaky {
    async fn handle(&self, task: Ping, attempt: u32) -> Result<(), Retry> {
        self.seen.lock().unwrap().push((task.n, attempt));
        if attempt <= self.failures {
            return Err(Retry(format!("attempt {} failed", attempt)));
        }
        Ok(())
    }
}

fn queue(max_deliveries: u32) -> (WorkQueue<Ping>, Arc<MemoryQueue>) {
    let transport = Arc::new(MemoryQueue::new());
    let settings = ConsumerSettings {
        max_deliveries,
        receive_timeout: Duration::from_millis(10),
    };
    (WorkQueue::new(transport.clone(), settings), transport)
}

#[tokio::test]
async fn failed_delivery_is_retried_with_growing_attempt() {
    let (queue, transport) = queue(5);
    let handler = Flaky::new(2);
    queue.publish(&Ping { n: 1 }).await.unwrap();

    let mut outcomes = Vec::new();
    while let Some(outcome) = queue.process_next(&handler).await.unwrap() {
        outcomes.push(outcome);
    }

    assert_eq!(
        outcomes,
        vec![Disposition::Requeued, Disposition::Requeued, Disposition::Acked]
    );
    assert_eq!(handler.seen(), vec![(1, 1), (1, 2), (1, 3)]);
    assert_eq!(transport.in_flight_len(), 0);
}

#[tokio::test]
async fn delivery_cap_dead_letters_instead_of_looping() {
    let (queue, transport) = queue(2);
    let handler = Flaky::new(u32::MAX);
    queue.publish(&Ping { n: 7 }).await.unwrap();

    assert_eq!(queue.process_next(&handler).await.unwrap(), Some(Disposition::Requeued));
    assert_eq!(queue.process_next(&handler).await.unwrap(), Some(Disposition::DeadLettered));
    assert_eq!(queue.process_next(&handler).await.unwrap(), None);

    assert_eq!(transport.dead_letters(), vec!["attempt 2 failed".to_string()]);
}

#[tokio::test]
async fn undecodable_payload_is_dead_lettered() {
    let (queue, transport) = queue(5);
    let handler = Flaky::new(0);
    transport.publish(b"{\"unexpected\":true}".to_vec()).await.unwrap();

    assert_eq!(queue.process_next(&handler).await.unwrap(), Some(Disposition::DeadLettered));
    assert!(handler.seen().is_empty());
    assert_eq!(transport.dead_letters().len(), 1);
}

#[tokio::test]
async fn consume_survives_transport_outage() {
    let (queue, transport) = queue(5);
    let handler = Arc::new(Flaky::new(0));
    let shutdown = CancellationToken::new();

    transport.set_available(false);
    let consumer = {
        let queue = queue.clone();
        let handler = handler.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { queue.consume(handler.as_ref(), shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    transport.set_available(true);
    queue.publish(&Ping { n: 3 }).await.unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(10), async {
        while handler.seen().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "consumer should resume after the outage");

    shutdown.cancel();
    consumer.await.unwrap();
    assert_eq!(handler.seen(), vec![(3, 1)]);
}
