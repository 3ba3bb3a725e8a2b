use axum::{routing::get, Router};
use ingestion_service::cache::ReadThroughCache;
use ingestion_service::config::IngestionConfig;
use ingestion_service::ingest::KeywordClassifier;
use ingestion_service::models::IngestionTask;
use ingestion_service::queue::{QueueTransport, RedisQueue, WorkQueue};
use ingestion_service::services::metrics::init_metrics;
use ingestion_service::services::CacheInvalidator;
use ingestion_service::startup::{connect_cache, connect_store, shutdown_signal};
use ingestion_service::workers::{IngestionWorker, WorkerPool};
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn metrics_endpoint() -> String {
    ingestion_service::services::metrics::get_metrics()
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = IngestionConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "ingestion-worker",
        &config.log_level(),
        config.otlp_endpoint.as_deref(),
    );

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics recorder not installed");
    }

    if !config.worker.enabled {
        tracing::info!("Worker pool disabled by configuration");
        return Ok(());
    }

    let store = connect_store(&config).await.map_err(|e| {
        tracing::error!("Failed to connect to the document store: {}", e);
        std::io::Error::other(format!("Database connection error: {}", e))
    })?;
    let cache: ReadThroughCache = connect_cache(&config).await;

    let settings = config.queue.consumer_settings();
    let worker = IngestionWorker::new(
        store,
        CacheInvalidator::new(cache),
        Arc::new(KeywordClassifier::default()),
    )
    .with_max_deliveries(settings.max_deliveries);

    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::new(worker, shutdown.clone());

    for index in 0..config.worker.worker_count.max(1) {
        let consumer = config.queue.consumer_name(index);
        let transport = RedisQueue::connect(&config.redis.url, &config.queue.name, &consumer)
            .await
            .map_err(|e| {
                tracing::error!(consumer = %consumer, "Failed to connect queue consumer: {}", e);
                std::io::Error::other(format!("Queue connection error: {}", e))
            })?;
        let queue: WorkQueue<IngestionTask> = WorkQueue::new(
            Arc::new(transport) as Arc<dyn QueueTransport>,
            settings.clone(),
        );
        pool.spawn_consumer(queue).await.map_err(|e| {
            tracing::error!(consumer = %consumer, "Failed to recover in-flight deliveries: {}", e);
            std::io::Error::other(format!("Queue recovery error: {}", e))
        })?;
    }

    tracing::info!(
        consumers = pool.len(),
        queue = %config.queue.name,
        "Worker pool started"
    );

    // Metrics only; the worker serves no API.
    let metrics_router = Router::new().route("/metrics", get(metrics_endpoint));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!("Failed to bind metrics listener to {}: {}", addr, e);
        e
    })?;
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let serve = axum::serve(listener, metrics_router)
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await });
        if let Err(e) = serve.await {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    shutdown_signal().await;
    pool.shutdown();
    pool.join().await;

    tracing::info!("Worker stopped");
    Ok(())
}
