//! Shared wiring for ingestion-service integration tests.
//!
//! Everything runs in-process against the memory implementations of the
//! store, cache and queue transport.

#![allow(dead_code)]

use axum::Router;
use ingestion_service::cache::{MemoryCache, ReadThroughCache};
use ingestion_service::ingest::KeywordClassifier;
use ingestion_service::models::{IngestionTask, Job, StatementFormat};
use ingestion_service::queue::{ConsumerSettings, Disposition, MemoryQueue, WorkQueue};
use ingestion_service::services::{
    CacheInvalidator, JobLedger, OwnerRepository, TransactionRepository,
};
use ingestion_service::startup::{router, AppState};
use ingestion_service::store::MemoryStore;
use ingestion_service::workers::IngestionWorker;
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub const MAX_DELIVERIES: u32 = 3;
pub const VIEW_TTL: Duration = Duration::from_secs(60);

/// Oldest line first; the last line carries the closing balance.
pub const SAMPLE_STATEMENT: &str = "\
01/02/2024,COFFEE SHOP,4.50,,100.00
01/03/2024,PAYCHECK,,2000.00,2100.00
01/04/2024,GROCERY STORE,65.20,,2034.80
";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,ingestion_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub transport: Arc<MemoryQueue>,
    pub queue: WorkQueue<IngestionTask>,
    pub state: AppState,
    pub worker: IngestionWorker,
}

pub fn spawn_app() -> TestApp {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let transport = Arc::new(MemoryQueue::new());

    let settings = ConsumerSettings {
        max_deliveries: MAX_DELIVERIES,
        receive_timeout: Duration::from_millis(10),
    };
    let queue = WorkQueue::new(transport.clone(), settings);
    let read_through = ReadThroughCache::new(cache.clone());

    let state = AppState::new(store.clone(), read_through.clone(), queue.clone(), VIEW_TTL);
    let worker = IngestionWorker::new(
        store.clone(),
        CacheInvalidator::new(read_through),
        Arc::new(KeywordClassifier::default()),
    )
    .with_max_deliveries(MAX_DELIVERIES);

    TestApp {
        store,
        cache,
        transport,
        queue,
        state,
        worker,
    }
}

impl TestApp {
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub fn ledger(&self) -> JobLedger {
        JobLedger::new(self.store.clone())
    }

    pub fn owners(&self) -> OwnerRepository {
        OwnerRepository::new(self.store.clone())
    }

    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository::new(self.store.clone())
    }

    pub async fn enqueue(&self, owner_id: &str, raw: &str) -> String {
        self.state
            .producer
            .enqueue_ingestion(owner_id, "statement.csv", raw.to_string(), StatementFormat::DebitCredit)
            .await
            .expect("enqueue should succeed")
    }

    /// Process deliveries until the queue is idle.
    pub async fn drain(&self) -> Vec<Disposition> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self
            .queue
            .process_next(&self.worker)
            .await
            .expect("queue transport should be up")
        {
            outcomes.push(outcome);
        }
        outcomes
    }

    pub async fn job(&self, job_id: &str) -> Job {
        self.ledger()
            .get(job_id)
            .await
            .expect("ledger read should succeed")
            .expect("job should exist")
    }
}
