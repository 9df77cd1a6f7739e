//! Job ledger repository
//!
//! Records the lifecycle of queue jobs and serves the monitoring dashboard:
//!
//! - **Lifecycle**: `pushed → reserved → released | completed | failed`, plus
//!   `remember` for jobs kept until explicitly deleted
//! - **Indexes**: `recent`, `pending`, `completed`, `silenced`, `failed`,
//!   `recent_failed`, `monitored`, each ordered by a monotonic rank
//! - **Counts**: index sizes and lifetime totals kept in memory, O(1) reads
//! - **Retention**: per-index age and size horizons, oldest-first eviction
//!
//! [`Engine`] is the synchronous core over a [`Store`]. [`LedgerRepository`]
//! wraps it for async callers: every storage-touching call runs on the
//! blocking pool under `storage.operation_timeout` and fails with
//! [`RepositoryError::Timeout`] when it expires.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jobledger::repository::{JobPayload, JobRepository, LedgerRepository, RepositoryOptions};
//!
//! let repo = LedgerRepository::open(store, RepositoryOptions::default())?;
//! let payload = JobPayload::builder().id("42").display_name("App\\Jobs\\Mail").build();
//! repo.pushed("redis", "emails", &payload).await?;
//! assert_eq!(repo.count_pending(), 1);
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

mod clock;
mod engine;
mod error;
mod indexes;
mod lifecycle;
mod locks;
mod models;
mod query;
mod trim;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::Engine;
pub use error::{RepositoryError, Result};
pub use lifecycle::{InvalidTransition, Transition};
pub use locks::DEFAULT_STRIPES;
pub use models::{
    Cursor, IndexKind, IndexedJob, JobFailure, JobPayload, JobRecord, JobStatus, Page,
    RepositoryStats, RetryAttempt, RetryStatus, TrimStats,
};
pub use query::{JobMatcher, SubstringMatcher, TagMatcher, matcher_for};
pub use trim::TRIM_CHUNK;

use crate::config::{Config, RetentionConfig, StorageBackend, StorageConfig};
use crate::observability::Metrics;
use crate::store::{FjallStore, MemoryStore, Store};

/// Construction options for the repository
#[derive(Clone)]
pub struct RepositoryOptions {
    pub retention: RetentionConfig,
    pub page_size: usize,
    pub lock_stripes: usize,
    pub operation_timeout: Duration,
    pub matcher: Arc<dyn JobMatcher>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            retention: RetentionConfig::default(),
            page_size: 50,
            lock_stripes: DEFAULT_STRIPES,
            operation_timeout: Duration::from_secs(2),
            matcher: Arc::new(SubstringMatcher),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(Metrics::new()),
        }
    }
}

impl RepositoryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retention: config.retention.clone(),
            page_size: config.query.page_size,
            lock_stripes: config.storage.lock_stripes,
            operation_timeout: config.storage.operation_timeout.as_duration(),
            matcher: matcher_for(config.query.search),
            ..Self::default()
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn JobMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// Open the backend selected by `storage.backend`
pub fn open_store(config: &StorageConfig) -> crate::store::Result<Arc<dyn Store>> {
    match config.backend {
        StorageBackend::Fjall => Ok(Arc::new(FjallStore::open(&config.path)?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Job-tracking repository consumed by queue workers and the dashboard
///
/// Lifecycle calls are made by workers on every job state change; reads are
/// made by the dashboard concurrently with them. Counts and totals are
/// served from memory and never touch storage.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn next_job_id(&self) -> Result<String>;

    /// Record a pushed job; returns its ID (assigned when the payload has none)
    async fn pushed(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<String>;

    async fn reserved(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<()>;

    async fn released(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<()>;

    /// Release each payload independently; stops at the first error
    async fn migrated(&self, connection: &str, queue: &str, payloads: &[JobPayload]) -> Result<()>;

    async fn remember(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<()>;

    async fn completed(&self, payload: &JobPayload, failed: bool, silenced: bool) -> Result<()>;

    async fn failed(
        &self,
        failure: JobFailure,
        connection: &str,
        queue: &str,
        payload: &JobPayload,
    ) -> Result<()>;

    /// Returns false when `job_id` is unknown
    async fn store_retry_reference(&self, job_id: &str, retry_id: &str) -> Result<bool>;

    async fn find_failed(&self, job_id: &str) -> Result<Option<JobRecord>>;

    async fn delete_failed(&self, job_id: &str) -> Result<usize>;

    async fn delete_monitored(&self, job_ids: &[String]) -> Result<usize>;

    async fn trim_recent_jobs(&self) -> Result<TrimStats>;

    async fn trim_failed_jobs(&self) -> Result<TrimStats>;

    async fn trim_monitored_jobs(&self) -> Result<TrimStats>;

    async fn get_recent(&self, after: Option<Cursor>) -> Result<Page>;

    async fn get_failed(&self, after: Option<Cursor>) -> Result<Page>;

    async fn get_pending(&self, after: Option<Cursor>, search: Option<String>) -> Result<Page>;

    async fn get_completed(&self, after: Option<Cursor>, search: Option<String>) -> Result<Page>;

    async fn get_silenced(&self, after: Option<Cursor>) -> Result<Page>;

    async fn get_jobs(&self, ids: &[String], index_from: usize) -> Result<Vec<IndexedJob>>;

    fn count_recent(&self) -> u64;

    fn count_failed(&self) -> u64;

    fn count_pending(&self) -> u64;

    fn count_completed(&self) -> u64;

    fn count_silenced(&self) -> u64;

    fn count_recently_failed(&self) -> u64;

    fn total_recent(&self) -> u64;

    fn total_failed(&self) -> u64;
}

/// [`JobRepository`] over an [`Engine`]
#[derive(Clone)]
pub struct LedgerRepository {
    engine: Arc<Engine>,
    timeout: Duration,
}

impl LedgerRepository {
    pub fn open(store: Arc<dyn Store>, options: RepositoryOptions) -> Result<Self> {
        let engine = Engine::open(store, &options)?;
        Ok(Self {
            engine: Arc::new(engine),
            timeout: options.operation_timeout,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.engine.metrics
    }

    pub fn stats(&self) -> RepositoryStats {
        self.engine.stats()
    }

    pub fn monitored_tags(&self) -> Vec<String> {
        self.engine.monitored_tags()
    }

    pub async fn monitor(&self, tag: &str) -> Result<()> {
        let tag = tag.to_string();
        self.blocking("monitor", move |engine| engine.monitor(&tag)).await
    }

    pub async fn stop_monitoring(&self, tag: &str) -> Result<()> {
        let tag = tag.to_string();
        self.blocking("stop_monitoring", move |engine| engine.stop_monitoring(&tag))
            .await
    }

    pub async fn get_monitored(&self, after: Option<Cursor>) -> Result<Page> {
        self.blocking("get_monitored", move |engine| engine.get_monitored(after.as_ref()))
            .await
    }

    pub async fn trim_all(&self) -> Result<TrimStats> {
        self.blocking("trim_all", |engine| engine.trim_all()).await
    }

    pub async fn persist(&self) -> Result<()> {
        self.blocking("persist", |engine| engine.persist()).await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.blocking("health_check", |engine| engine.health_check()).await
    }

    /// Run `f` on the blocking pool, bounded by the operation timeout
    ///
    /// An expired call keeps running to completion in the background; its
    /// batch is still atomic.
    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> Result<T> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || f(&engine));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RepositoryError::Internal(format!(
                "{} task failed: {}",
                op, join_err
            ))),
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Repository operation timed out");
                self.engine.metrics.timeout();
                Err(RepositoryError::Timeout {
                    op,
                    after: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl JobRepository for LedgerRepository {
    async fn next_job_id(&self) -> Result<String> {
        self.blocking("next_job_id", |engine| engine.next_job_id()).await
    }

    async fn pushed(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<String> {
        let (connection, queue, payload) = (connection.to_string(), queue.to_string(), payload.clone());
        self.blocking("pushed", move |engine| engine.pushed(&connection, &queue, &payload))
            .await
    }

    async fn reserved(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<()> {
        let (connection, queue, payload) = (connection.to_string(), queue.to_string(), payload.clone());
        self.blocking("reserved", move |engine| engine.reserved(&connection, &queue, &payload))
            .await
    }

    async fn released(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<()> {
        let (connection, queue, payload) = (connection.to_string(), queue.to_string(), payload.clone());
        self.blocking("released", move |engine| engine.released(&connection, &queue, &payload))
            .await
    }

    async fn migrated(&self, connection: &str, queue: &str, payloads: &[JobPayload]) -> Result<()> {
        let (connection, queue, payloads) =
            (connection.to_string(), queue.to_string(), payloads.to_vec());
        self.blocking("migrated", move |engine| engine.migrated(&connection, &queue, &payloads))
            .await
    }

    async fn remember(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<()> {
        let (connection, queue, payload) = (connection.to_string(), queue.to_string(), payload.clone());
        self.blocking("remember", move |engine| engine.remember(&connection, &queue, &payload))
            .await
    }

    async fn completed(&self, payload: &JobPayload, failed: bool, silenced: bool) -> Result<()> {
        let payload = payload.clone();
        self.blocking("completed", move |engine| engine.completed(&payload, failed, silenced))
            .await
    }

    async fn failed(
        &self,
        failure: JobFailure,
        connection: &str,
        queue: &str,
        payload: &JobPayload,
    ) -> Result<()> {
        let (connection, queue, payload) = (connection.to_string(), queue.to_string(), payload.clone());
        self.blocking("failed", move |engine| {
            engine.failed(failure, &connection, &queue, &payload)
        })
        .await
    }

    async fn store_retry_reference(&self, job_id: &str, retry_id: &str) -> Result<bool> {
        let (job_id, retry_id) = (job_id.to_string(), retry_id.to_string());
        self.blocking("store_retry_reference", move |engine| {
            engine.store_retry_reference(&job_id, &retry_id)
        })
        .await
    }

    async fn find_failed(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let job_id = job_id.to_string();
        self.blocking("find_failed", move |engine| engine.find_failed(&job_id))
            .await
    }

    async fn delete_failed(&self, job_id: &str) -> Result<usize> {
        let job_id = job_id.to_string();
        self.blocking("delete_failed", move |engine| engine.delete_failed(&job_id))
            .await
    }

    async fn delete_monitored(&self, job_ids: &[String]) -> Result<usize> {
        let job_ids = job_ids.to_vec();
        self.blocking("delete_monitored", move |engine| engine.delete_monitored(&job_ids))
            .await
    }

    async fn trim_recent_jobs(&self) -> Result<TrimStats> {
        self.blocking("trim_recent_jobs", |engine| engine.trim_recent_jobs())
            .await
    }

    async fn trim_failed_jobs(&self) -> Result<TrimStats> {
        self.blocking("trim_failed_jobs", |engine| engine.trim_failed_jobs())
            .await
    }

    async fn trim_monitored_jobs(&self) -> Result<TrimStats> {
        self.blocking("trim_monitored_jobs", |engine| engine.trim_monitored_jobs())
            .await
    }

    async fn get_recent(&self, after: Option<Cursor>) -> Result<Page> {
        self.blocking("get_recent", move |engine| engine.get_recent(after.as_ref()))
            .await
    }

    async fn get_failed(&self, after: Option<Cursor>) -> Result<Page> {
        self.blocking("get_failed", move |engine| engine.get_failed(after.as_ref()))
            .await
    }

    async fn get_pending(&self, after: Option<Cursor>, search: Option<String>) -> Result<Page> {
        self.blocking("get_pending", move |engine| {
            engine.get_pending(after.as_ref(), search.as_deref())
        })
        .await
    }

    async fn get_completed(&self, after: Option<Cursor>, search: Option<String>) -> Result<Page> {
        self.blocking("get_completed", move |engine| {
            engine.get_completed(after.as_ref(), search.as_deref())
        })
        .await
    }

    async fn get_silenced(&self, after: Option<Cursor>) -> Result<Page> {
        self.blocking("get_silenced", move |engine| engine.get_silenced(after.as_ref()))
            .await
    }

    async fn get_jobs(&self, ids: &[String], index_from: usize) -> Result<Vec<IndexedJob>> {
        let ids = ids.to_vec();
        self.blocking("get_jobs", move |engine| engine.get_jobs(&ids, index_from))
            .await
    }

    fn count_recent(&self) -> u64 {
        self.engine.count(IndexKind::Recent)
    }

    fn count_failed(&self) -> u64 {
        self.engine.count(IndexKind::Failed)
    }

    fn count_pending(&self) -> u64 {
        self.engine.count(IndexKind::Pending)
    }

    fn count_completed(&self) -> u64 {
        self.engine.count(IndexKind::Completed)
    }

    fn count_silenced(&self) -> u64 {
        self.engine.count(IndexKind::Silenced)
    }

    fn count_recently_failed(&self) -> u64 {
        self.engine.count(IndexKind::RecentFailed)
    }

    fn total_recent(&self) -> u64 {
        self.engine.total_recent()
    }

    fn total_failed(&self) -> u64 {
        self.engine.total_failed()
    }
}
