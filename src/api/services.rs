use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use super::{
    error::ApiError,
    models::{
        BatchRequest, DeleteMonitoredRequest, DeletedResponse, HealthResponse, ListQuery,
        MonitorRequest, StatsResponse, TagsResponse,
    },
    state::AppState,
    validation,
};
use crate::repository::{IndexKind, JobRepository};

/// Listing endpoint (GET /api/jobs/{view}?after=&search=)
///
/// `after` is the `next` cursor of the previous page. `search` filters the
/// pending and completed views and is ignored elsewhere.
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(view): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let index = validation::parse_view(&view)?;
    let after = validation::parse_cursor(query.after.as_deref())?;
    validation::validate_search(query.search.as_deref())?;

    let repo = &state.repository;
    let page = match index {
        IndexKind::Recent => repo.get_recent(after).await?,
        IndexKind::Pending => repo.get_pending(after, query.search).await?,
        IndexKind::Completed => repo.get_completed(after, query.search).await?,
        IndexKind::Silenced => repo.get_silenced(after).await?,
        IndexKind::Failed => repo.get_failed(after).await?,
        IndexKind::Monitored => repo.get_monitored(after).await?,
        IndexKind::RecentFailed => return Err(ApiError::NotFound(format!("view {view}"))),
    };

    Ok((StatusCode::OK, Json(page)))
}

/// Batch lookup (POST /api/jobs/batch)
pub async fn get_jobs(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_ids(&request.ids)?;

    let jobs = state
        .repository
        .get_jobs(&request.ids, request.index_from)
        .await?;

    Ok((StatusCode::OK, Json(jobs)))
}

/// Failed job detail (GET /api/failed/{job_id})
pub async fn get_failed_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .repository
        .find_failed(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("failed job {job_id}")))?;

    Ok((StatusCode::OK, Json(record)))
}

/// Delete a failed job (DELETE /api/failed/{job_id})
///
/// Deleting an unknown or already deleted job reports `deleted: 0`.
pub async fn delete_failed_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.repository.delete_failed(&job_id).await?;
    info!(job_id, deleted, "Failed job delete requested");

    Ok((StatusCode::OK, Json(DeletedResponse { deleted })))
}

/// Delete monitored jobs (DELETE /api/monitored)
pub async fn delete_monitored(
    State(state): State<AppState>,
    Json(request): Json<DeleteMonitoredRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_ids(&request.ids)?;

    let deleted = state.repository.delete_monitored(&request.ids).await?;
    info!(requested = request.ids.len(), deleted, "Monitored jobs delete requested");

    Ok((StatusCode::OK, Json(DeletedResponse { deleted })))
}

/// Run a trim pass over every index (POST /api/trim)
pub async fn trim(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.repository.trim_all().await?;
    Ok((StatusCode::OK, Json(stats)))
}

/// Counts, lifetime totals and metrics (GET /api/stats)
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let response = StatsResponse {
        counts: state.repository.stats(),
        monitored_tags: state.repository.monitored_tags(),
        page_size: state.config.query.page_size,
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}

/// Monitored tags (GET /api/monitoring)
pub async fn list_monitored_tags(State(state): State<AppState>) -> impl IntoResponse {
    let tags = state.repository.monitored_tags();
    (StatusCode::OK, Json(TagsResponse { tags }))
}

/// Start monitoring a tag (POST /api/monitoring)
pub async fn monitor_tag(
    State(state): State<AppState>,
    Json(request): Json<MonitorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_tag(&request.tag)?;
    state.repository.monitor(request.tag.trim()).await?;

    let tags = state.repository.monitored_tags();
    Ok((StatusCode::CREATED, Json(TagsResponse { tags })))
}

/// Stop monitoring a tag (DELETE /api/monitoring/{tag})
pub async fn stop_monitoring_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.repository.stop_monitoring(&tag).await?;

    let tags = state.repository.monitored_tags();
    Ok((StatusCode::OK, Json(TagsResponse { tags })))
}

/// Health check endpoint (GET /health)
///
/// Returns 503 Service Unavailable when the store cannot be read.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let store_status = match state.repository.health_check().await {
        Ok(()) => "healthy".to_string(),
        Err(err) => format!("unhealthy: {}", err),
    };
    components.insert("store".to_string(), store_status);

    let all_healthy = components.values().all(|status| status == "healthy");
    let (status_code, overall_status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
