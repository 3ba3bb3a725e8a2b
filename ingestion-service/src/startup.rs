use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{http_metrics, request_id};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::cache::{CacheStore, ReadThroughCache, RedisCache};
use crate::config::IngestionConfig;
use crate::handlers;
use crate::models::IngestionTask;
use crate::queue::{QueueTransport, RedisQueue, WorkQueue};
use crate::services::{
    CacheInvalidator, IngestionProducer, JobLedger, OwnerRepository, ProfileService,
    TransactionRepository, ViewService,
};
use crate::store::{DocumentStore, MongoStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub cache: ReadThroughCache,
    pub producer: IngestionProducer,
    pub views: ViewService,
    pub profile: ProfileService,
    pub invalidator: CacheInvalidator,
}

impl AppState {
    /// Wire every service over the given collaborators.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: ReadThroughCache,
        queue: WorkQueue<IngestionTask>,
        view_ttl: Duration,
    ) -> Self {
        let invalidator = CacheInvalidator::new(cache.clone());
        let profile = ProfileService::new(store.clone(), invalidator.clone());
        let views = ViewService::new(
            TransactionRepository::new(store.clone()),
            OwnerRepository::new(store.clone()),
            profile.clone(),
            cache.clone(),
            view_ttl,
        );
        let producer = IngestionProducer::new(JobLedger::new(store.clone()), queue);

        Self {
            store,
            cache,
            producer,
            views,
            profile,
            invalidator,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route(
            "/statements",
            post(handlers::upload_statement)
                .layer(DefaultBodyLimit::max(handlers::statements::UPLOAD_BODY_LIMIT)),
        )
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/:job_id", get(handlers::get_job))
        .route("/views/dashboard", get(handlers::views::dashboard))
        .route("/views/transactions", get(handlers::views::transactions))
        .route("/views/insights", get(handlers::views::insights))
        .route(
            "/profile/goals/:id",
            put(handlers::profile::put_goal).delete(handlers::profile::delete_goal),
        )
        .route(
            "/profile/income/:id",
            put(handlers::profile::put_income).delete(handlers::profile::delete_income),
        )
        .route("/profile/insights", post(handlers::profile::create_insight))
        .route("/profile/insights/:id", delete(handlers::profile::delete_insight))
        .route("/cache/invalidate", post(handlers::views::invalidate_cache))
        .layer(middleware::from_fn(http_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

/// Cache is optional: when Redis cannot be reached the service still serves
/// every view straight from the store.
pub async fn connect_cache(config: &IngestionConfig) -> ReadThroughCache {
    if !config.cache.enabled {
        tracing::info!("View cache disabled by configuration");
        return ReadThroughCache::disabled();
    }

    match RedisCache::connect(&config.redis.url).await {
        Ok(cache) => ReadThroughCache::new(Arc::new(cache) as Arc<dyn CacheStore>),
        Err(e) => {
            tracing::warn!(error = %e, "View cache unavailable, serving from the store");
            ReadThroughCache::disabled()
        }
    }
}

pub async fn connect_store(config: &IngestionConfig) -> Result<Arc<dyn DocumentStore>, AppError> {
    let store = MongoStore::connect(&config.mongodb.uri, &config.mongodb.database).await?;
    store.initialize_indexes().await.map_err(|e| {
        tracing::error!("Failed to initialize database indexes: {}", e);
        e
    })?;
    Ok(Arc::new(store))
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: IngestionConfig) -> Result<Self, AppError> {
        let store = connect_store(&config).await?;
        let cache = connect_cache(&config).await;

        let transport = RedisQueue::connect(&config.redis.url, &config.queue.name, "producer")
            .await
            .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
        let queue = WorkQueue::new(
            Arc::new(transport) as Arc<dyn QueueTransport>,
            config.queue.consumer_settings(),
        );

        let state = AppState::new(store, cache, queue, config.cache.ttl());
        let app = router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
