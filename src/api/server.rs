use axum::{
    Router,
    routing::{delete, get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::{
    services::{
        delete_failed_job, delete_monitored, get_failed_job, get_jobs, health, list_jobs,
        list_monitored_tags, monitor_tag, stats, stop_monitoring_tag, trim,
    },
    state::AppState,
};

/// Dashboard API routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/jobs/batch", post(get_jobs))
        .route("/api/jobs/{view}", get(list_jobs))
        .route("/api/failed/{job_id}", get(get_failed_job).delete(delete_failed_job))
        .route("/api/monitored", delete(delete_monitored))
        .route("/api/trim", post(trim))
        .route("/api/monitoring", get(list_monitored_tags).post(monitor_tag))
        .route("/api/monitoring/{tag}", delete(stop_monitoring_tag))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
