use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{EntryRequest, EntryResponse, InsightRequest, InsightResponse};
use crate::middleware::OwnerId;
use crate::services::profile::ProfileKind;
use crate::startup::AppState;

async fn put_entry(
    state: &AppState,
    owner: &OwnerId,
    kind: ProfileKind,
    id: &str,
    request: EntryRequest,
) -> Result<Json<EntryResponse>, AppError> {
    let entry = state
        .profile
        .put_entry(&owner.0, kind, id, request.payload)
        .await?;
    Ok(Json(entry.into()))
}

pub async fn put_goal(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(id): Path<String>,
    Json(request): Json<EntryRequest>,
) -> Result<Json<EntryResponse>, AppError> {
    put_entry(&state, &owner, ProfileKind::Goal, &id, request).await
}

pub async fn delete_goal(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.profile.delete_entry(&owner.0, ProfileKind::Goal, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn put_income(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(id): Path<String>,
    Json(request): Json<EntryRequest>,
) -> Result<Json<EntryResponse>, AppError> {
    put_entry(&state, &owner, ProfileKind::IncomeSource, &id, request).await
}

pub async fn delete_income(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .profile
        .delete_entry(&owner.0, ProfileKind::IncomeSource, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_insight(
    State(state): State<AppState>,
    owner: OwnerId,
    Json(request): Json<InsightRequest>,
) -> Result<(StatusCode, Json<InsightResponse>), AppError> {
    request.validate()?;

    let insight = state
        .profile
        .record_insight(&owner.0, &request.analysis_type, request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(insight.into())))
}

pub async fn delete_insight(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.profile.delete_insight(&owner.0, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
