use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{JobListParams, JobListResponse, JobResponse};
use crate::middleware::OwnerId;
use crate::startup::AppState;

pub async fn list_jobs(
    State(state): State<AppState>,
    owner: OwnerId,
    Query(params): Query<JobListParams>,
) -> Result<Json<JobListResponse>, AppError> {
    params.validate()?;

    let jobs = state.producer.list_jobs(&owner.0, params.limit).await?;
    Ok(Json(JobListResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
    }))
}

pub async fn get_job(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job = state
        .producer
        .get_job_status(&owner.0, &job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Job {} not found", job_id)))?;

    Ok(Json(job.into()))
}
