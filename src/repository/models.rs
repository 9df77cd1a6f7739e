//! Job lifecycle data model.
//!
//! - [`JobPayload`]: what the queue dispatcher hands over on every transition
//! - [`JobRecord`]: the canonical stored record, one per job ID
//! - [`IndexKind`]: the dashboard views maintained over records
//! - [`Cursor`] / [`Page`]: forward pagination over an index
//!
//! The payload `body` is opaque. Only `id`, `display_name`, `tags` and
//! `retry_of` are read by the repository.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Job payload as reported by the queue dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct JobPayload {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub display_name: String,
    #[builder(default = Uuid::new_v4())]
    pub uuid: Uuid,
    #[builder(into, default)]
    #[serde(default)]
    pub body: String,
    #[builder(default)]
    #[serde(default)]
    pub tags: Vec<String>,
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

impl JobPayload {
    pub fn is_retry(&self) -> bool {
        self.retry_of.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Reserved,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Reserved => "reserved",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail passed to `failed`, stored verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    #[serde(default)]
    pub trace: String,
}

impl JobFailure {
    pub fn new(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: trace.into(),
        }
    }

    /// Message from the error itself, trace from its `source()` chain
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut trace = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        Self::new(err.to_string(), trace.join("\n"))
    }

    /// Placeholder for jobs completed as failed without a reported exception
    pub fn unreported() -> Self {
        Self::new("job reported as failed on completion", "")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Pending,
    Completed,
    Failed,
}

/// Link from a failed job to one of its retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub id: String,
    pub status: RetryStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub retried_at: DateTime<Utc>,
}

/// Dashboard views maintained over job records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Recent,
    Pending,
    Completed,
    Silenced,
    Failed,
    RecentFailed,
    Monitored,
}

impl IndexKind {
    pub const ALL: [IndexKind; 7] = [
        IndexKind::Recent,
        IndexKind::Pending,
        IndexKind::Completed,
        IndexKind::Silenced,
        IndexKind::Failed,
        IndexKind::RecentFailed,
        IndexKind::Monitored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Recent => "recent",
            IndexKind::Pending => "pending",
            IndexKind::Completed => "completed",
            IndexKind::Silenced => "silenced",
            IndexKind::Failed => "failed",
            IndexKind::RecentFailed => "recent_failed",
            IndexKind::Monitored => "monitored",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown index: {}", s))
    }
}

/// Canonical stored job record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub connection: String,
    pub queue: String,
    pub name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub silenced: bool,
    pub payload: JobPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    #[serde(default)]
    pub retries: Vec<RetryAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub pushed_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub reserved_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub failed_at: Option<DateTime<Utc>>,
    /// Index memberships: index -> rank of this job's entry
    #[serde(default)]
    pub memberships: BTreeMap<IndexKind, u64>,
}

impl JobRecord {
    pub fn new(connection: &str, queue: &str, payload: &JobPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: payload.id.clone(),
            connection: connection.to_string(),
            queue: queue.to_string(),
            name: payload.display_name.clone(),
            status: JobStatus::Pending,
            silenced: false,
            payload: payload.clone(),
            retry_of: payload.retry_of.clone(),
            retries: Vec::new(),
            failure: None,
            pushed_at: now,
            updated_at: now,
            reserved_at: None,
            completed_at: None,
            failed_at: None,
            memberships: BTreeMap::new(),
        }
    }

    pub fn is_member_of(&self, index: IndexKind) -> bool {
        self.memberships.contains_key(&index)
    }

    /// Refresh routing fields from the latest payload
    pub fn absorb(&mut self, connection: &str, queue: &str, payload: &JobPayload) {
        self.connection = connection.to_string();
        self.queue = queue.to_string();
        self.name = payload.display_name.clone();
        self.payload = payload.clone();
        if payload.retry_of.is_some() {
            self.retry_of = payload.retry_of.clone();
        }
    }
}

/// Position of the last entry seen in an index
///
/// Pagination resumes strictly after this position, so a cursor whose entry
/// has since been trimmed still resumes at the next surviving entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub rank: u64,
    pub id: String,
}

impl Cursor {
    pub fn new(rank: u64, id: impl Into<String>) -> Self {
        Self { rank, id: id.into() }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.rank, self.id)
    }
}

impl FromStr for Cursor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rank, id) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid cursor: {}", s))?;
        let rank = rank.parse().map_err(|_| format!("invalid cursor rank: {}", s))?;
        if id.is_empty() {
            return Err(format!("invalid cursor id: {}", s));
        }
        Ok(Cursor::new(rank, id))
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One chunk of an index, most recent first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub jobs: Vec<JobRecord>,
    /// Present when the chunk was full; pass back to continue
    pub next: Option<Cursor>,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            jobs: Vec::new(),
            next: None,
        }
    }
}

/// Job returned by `get_jobs` with its position in the requested slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedJob {
    pub index: usize,
    pub job: JobRecord,
}

/// Counts and lifetime totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub recent: u64,
    pub pending: u64,
    pub completed: u64,
    pub silenced: u64,
    pub failed: u64,
    pub recently_failed: u64,
    pub monitored: u64,
    pub total_recent: u64,
    pub total_failed: u64,
}

/// Entries evicted by a trim pass, per index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimStats {
    pub evicted: BTreeMap<IndexKind, usize>,
    /// Records deleted because no index referenced them any more
    pub records_deleted: usize,
}

impl TrimStats {
    pub fn total(&self) -> usize {
        self.evicted.values().sum()
    }

    pub fn evicted_from(&self, index: IndexKind) -> usize {
        self.evicted.get(&index).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: TrimStats) {
        for (index, count) in other.evicted {
            *self.evicted.entry(index).or_default() += count;
        }
        self.records_deleted += other.records_deleted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_builder_defaults() {
        let payload = JobPayload::builder()
            .id("1")
            .display_name("App\\Jobs\\SendEmail")
            .build();

        assert_eq!(payload.id, "1");
        assert!(payload.body.is_empty());
        assert!(payload.tags.is_empty());
        assert!(!payload.is_retry());
    }

    #[test]
    fn test_cursor_round_trip_with_dashes() {
        let cursor = Cursor::new(42, "9f1c-4e2a-b7");
        let parsed: Cursor = cursor.to_string().parse().unwrap();
        assert_eq!(parsed, cursor);

        assert!("nope".parse::<Cursor>().is_err());
        assert!("x-1".parse::<Cursor>().is_err());
        assert!("5-".parse::<Cursor>().is_err());
    }

    #[test]
    fn test_index_kind_parse() {
        assert_eq!("recent_failed".parse::<IndexKind>().unwrap(), IndexKind::RecentFailed);
        assert!("reserved".parse::<IndexKind>().is_err());
    }

    #[test]
    fn test_record_json_keeps_memberships() {
        let payload = JobPayload::builder().id("7").display_name("Job").build();
        let mut record = JobRecord::new("redis", "default", &payload, Utc::now());
        record.memberships.insert(IndexKind::Recent, 3);
        record.memberships.insert(IndexKind::RecentFailed, 4);

        let json = serde_json::to_vec(&record).unwrap();
        let decoded: JobRecord = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded.memberships.get(&IndexKind::RecentFailed), Some(&4));
    }

    #[test]
    fn test_failure_from_error_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let failure = JobFailure::from_error(&io);
        assert_eq!(failure.message, "disk full");
        assert!(failure.trace.is_empty());
    }

    #[test]
    fn test_trim_stats_merge() {
        let mut stats = TrimStats::default();
        stats.evicted.insert(IndexKind::Recent, 2);

        let mut other = TrimStats::default();
        other.evicted.insert(IndexKind::Recent, 1);
        other.evicted.insert(IndexKind::Pending, 4);
        other.records_deleted = 1;

        stats.merge(other);
        assert_eq!(stats.evicted_from(IndexKind::Recent), 3);
        assert_eq!(stats.total(), 7);
        assert_eq!(stats.records_deleted, 1);
    }
}
