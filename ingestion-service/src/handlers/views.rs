use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{InvalidateResponse, ViewParams};
use crate::middleware::OwnerId;
use crate::models::{DashboardView, InsightsView, TransactionsView};
use crate::startup::AppState;

pub async fn dashboard(
    State(state): State<AppState>,
    owner: OwnerId,
    Query(params): Query<ViewParams>,
) -> Result<Json<DashboardView>, AppError> {
    let view = state.views.dashboard(&owner.0, params.no_cache).await?;
    Ok(Json(view))
}

pub async fn transactions(
    State(state): State<AppState>,
    owner: OwnerId,
    Query(params): Query<ViewParams>,
) -> Result<Json<TransactionsView>, AppError> {
    params.validate()?;

    let view = state
        .views
        .transactions(&owner.0, params.limit, params.no_cache)
        .await?;
    Ok(Json(view))
}

pub async fn insights(
    State(state): State<AppState>,
    owner: OwnerId,
    Query(params): Query<ViewParams>,
) -> Result<Json<InsightsView>, AppError> {
    let view = state.views.insights(&owner.0, params.no_cache).await?;
    Ok(Json(view))
}

pub async fn invalidate_cache(
    State(state): State<AppState>,
    owner: OwnerId,
) -> Json<InvalidateResponse> {
    let removed = state.invalidator.invalidate_owner(&owner.0).await;
    tracing::info!(owner_id = %owner.0, removed, "Owner views invalidated on request");
    Json(InvalidateResponse { removed })
}
