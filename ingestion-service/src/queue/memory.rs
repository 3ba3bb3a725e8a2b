use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use super::{Delivery, Envelope, QueueError, QueueTransport};

#[derive(Default)]
struct QueueState {
    ready: VecDeque<String>,
    in_flight: Vec<String>,
    dead: Vec<(String, String)>,
}

/// In-process transport with the same envelope and settlement rules as
/// [`super::RedisQueue`].
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    available: AtomicBool,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn ready_len(&self) -> usize {
        self.state.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    /// Dead-letter reasons, oldest first.
    pub fn dead_letters(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.dead.iter().map(|(_, reason)| reason.clone()).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("memory queue offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|e| QueueError::Unavailable(format!("Memory queue mutex poisoned: {}", e)))
    }

    fn try_take(&self) -> Result<Option<String>, QueueError> {
        let mut state = self.lock()?;
        let next = state.ready.pop_front();
        if let Some(raw) = &next {
            state.in_flight.push(raw.clone());
        }
        Ok(next)
    }

    fn settle(state: &mut QueueState, receipt: &str) -> bool {
        match state.in_flight.iter().position(|raw| raw == receipt) {
            Some(index) => {
                state.in_flight.remove(index);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        let raw = Envelope::new(&payload).encode()?;
        self.lock()?.ready.push_back(raw);
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(raw) = self.try_take()? {
                let delivery = Envelope::decode(&raw).and_then(|e| e.into_delivery(raw.clone()));
                return match delivery {
                    Ok(delivery) => Ok(Some(delivery)),
                    Err(e) => {
                        let mut state = self.lock()?;
                        Self::settle(&mut state, &raw);
                        state.dead.push((raw, e.to_string()));
                        Ok(None)
                    }
                };
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        Self::settle(&mut state, &delivery.receipt);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError> {
        {
            let mut state = self.lock()?;
            if !Self::settle(&mut state, &delivery.receipt) || !requeue {
                return Ok(());
            }
            let next = Envelope::decode(&delivery.receipt)?.redelivered().encode()?;
            state.ready.push_front(next);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        Self::settle(&mut state, &delivery.receipt);
        state
            .dead
            .push((delivery.receipt.clone(), reason.to_string()));
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let recovered = {
            let mut state = self.lock()?;
            let stranded: Vec<String> = state.in_flight.drain(..).collect();
            for raw in stranded.iter().rev() {
                let next = Envelope::decode(raw)?.redelivered().encode()?;
                state.ready.push_front(next);
            }
            stranded.len()
        };
        if recovered > 0 {
            self.notify.notify_one();
        }
        Ok(recovered)
    }
}
