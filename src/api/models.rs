//! Request and response bodies of the dashboard API.
//!
//! Listings return a [`Page`] as-is: `jobs` most recent first, `next` the
//! cursor to pass back as `?after=` (absent on the last page).
//!
//! ```json
//! {
//!   "jobs": [{ "id": "42", "queue": "emails", "status": "pending", "...": "..." }],
//!   "next": "1093-42"
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;
use crate::repository::RepositoryStats;

pub use crate::repository::{IndexedJob, Page, TrimStats};

/// Query string of `GET /api/jobs/{view}`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub after: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub index_from: usize,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMonitoredRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MonitorRequest {
    pub tag: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeletedResponse {
    pub deleted: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TagsResponse {
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counts: RepositoryStats,
    pub monitored_tags: Vec<String>,
    pub page_size: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
