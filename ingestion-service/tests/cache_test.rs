mod common;

use common::{spawn_app, SAMPLE_STATEMENT};
use ingestion_service::cache::{CacheKeys, CacheStore};
use serde_json::json;

#[tokio::test]
async fn empty_transaction_views_are_never_cached() {
    let app = spawn_app();

    let before = app.state.views.transactions("u1", None, false).await.unwrap();
    assert!(before.transactions.is_empty());
    let dashboard = app.state.views.dashboard("u1", false).await.unwrap();
    assert!(dashboard.transactions.is_empty());
    assert!(app.cache.keys().is_empty());

    app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.drain().await;

    let after = app.state.views.transactions("u1", None, false).await.unwrap();
    assert_eq!(after.transactions.len(), 3);
    assert_eq!(app.cache.keys(), vec![CacheKeys::transactions("u1", None)]);
}

#[tokio::test]
async fn cached_empty_value_is_treated_as_a_miss() {
    let app = spawn_app();
    app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.drain().await;

    // Simulate a stale empty page written by an older process.
    let key = CacheKeys::transactions("u1", Some(10));
    let stale = json!({ "transactions": [], "cached_at": "2024-01-01T00:00:00Z" });
    app.cache
        .set(&key, &stale.to_string(), common::VIEW_TTL)
        .await
        .unwrap();

    let view = app.state.views.transactions("u1", Some(10), false).await.unwrap();
    assert_eq!(view.transactions.len(), 3);
}

#[tokio::test]
async fn ingestion_invalidates_cached_views() {
    let app = spawn_app();
    app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.drain().await;

    let first = app.state.views.dashboard("u1", false).await.unwrap();
    assert_eq!(first.transactions.len(), 3);
    app.state.views.transactions("u1", Some(50), false).await.unwrap();
    assert_eq!(app.cache.keys().len(), 2);

    app.enqueue("u1", "01/05/2024,NETFLIX,15.99,,2018.81\n").await;
    app.drain().await;
    assert!(app.cache.keys().is_empty());

    let second = app.state.views.dashboard("u1", false).await.unwrap();
    assert_eq!(second.transactions.len(), 4);
    assert_eq!(second.balance.map(|b| b.to_string()), Some("2018.81".to_string()));
}

#[tokio::test]
async fn cached_dashboard_is_served_until_invalidated() {
    let app = spawn_app();
    app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.drain().await;

    let first = app.state.views.dashboard("u1", false).await.unwrap();
    let again = app.state.views.dashboard("u1", false).await.unwrap();
    assert_eq!(first.cached_at, again.cached_at);

    let fresh = app.state.views.dashboard("u1", true).await.unwrap();
    assert!(fresh.cached_at >= first.cached_at);
    let after_bypass = app.state.views.dashboard("u1", false).await.unwrap();
    assert_eq!(after_bypass.cached_at, fresh.cached_at);
}

#[tokio::test]
async fn cache_outage_falls_back_to_the_store() {
    let app = spawn_app();
    app.cache.set_available(false);

    app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.drain().await;

    let view = app.state.views.dashboard("u1", false).await.unwrap();
    assert_eq!(view.transactions.len(), 3);
    assert_eq!(view.spending_summary.len(), 1);

    app.cache.set_available(true);
    let view = app.state.views.transactions("u1", None, false).await.unwrap();
    assert_eq!(view.transactions.len(), 3);
}

#[tokio::test]
async fn profile_writes_invalidate_their_views() {
    let app = spawn_app();
    app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.drain().await;

    app.state.views.dashboard("u1", false).await.unwrap();
    app.state.views.insights("u1", false).await.unwrap();
    assert_eq!(app.cache.keys().len(), 2);

    app.state
        .profile
        .record_insight("u1", "quick_insight", json!({"text": "spend less on coffee"}))
        .await
        .unwrap();
    assert_eq!(app.cache.keys(), vec![CacheKeys::dashboard("u1")]);

    let insights = app.state.views.insights("u1", false).await.unwrap();
    assert!(insights.quick_insight.is_some());
    assert_eq!(insights.analysis_history.len(), 1);
}

#[tokio::test]
async fn explicit_invalidation_is_owner_scoped() {
    let app = spawn_app();
    app.enqueue("u1", SAMPLE_STATEMENT).await;
    app.enqueue("u2", SAMPLE_STATEMENT).await;
    app.drain().await;

    for owner in ["u1", "u2"] {
        app.state.views.dashboard(owner, false).await.unwrap();
        app.state.views.transactions(owner, None, false).await.unwrap();
    }
    assert_eq!(app.cache.keys().len(), 4);

    let removed = app.state.invalidator.invalidate_owner("u1").await;
    assert_eq!(removed, 2);
    assert!(app.cache.keys().iter().all(|k| k.contains("u2")));
}
