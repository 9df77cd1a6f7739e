//! Retention: oldest-first eviction of index entries.
//!
//! Each index is walked in ascending rank order in chunks of
//! [`TRIM_CHUNK`] keys. Only the evicted job's stripe lock is taken, so
//! writers keep going while a trim runs. Ranks are assigned in commit order,
//! which makes the walk approximately oldest-first; the age pass stops at
//! the first entry younger than the horizon.

use std::ops::Bound;
use std::time::Instant;

use tracing::{info, warn};

use super::engine::Engine;
use super::error::Result;
use super::models::{IndexKind, TrimStats};
use crate::store::partitions::{
    decode_index_entry, decode_index_key, encode_index_prefix, encode_index_upper_bound,
};
use crate::store::{Direction, KvPair, Partition};

pub const TRIM_CHUNK: usize = 256;

const RECENT_GROUP: [IndexKind; 4] = [
    IndexKind::Recent,
    IndexKind::Pending,
    IndexKind::Completed,
    IndexKind::Silenced,
];
const FAILED_GROUP: [IndexKind; 2] = [IndexKind::RecentFailed, IndexKind::Failed];
const MONITORED_GROUP: [IndexKind; 1] = [IndexKind::Monitored];

impl Engine {
    /// Trim `recent`, `pending`, `completed` and `silenced`
    pub fn trim_recent_jobs(&self) -> Result<TrimStats> {
        self.trim_group("recent", &RECENT_GROUP)
    }

    /// Trim `recent_failed` and `failed`
    pub fn trim_failed_jobs(&self) -> Result<TrimStats> {
        self.trim_group("failed", &FAILED_GROUP)
    }

    /// Trim `monitored`; entries pinned by `remember` are never evicted
    pub fn trim_monitored_jobs(&self) -> Result<TrimStats> {
        self.trim_group("monitored", &MONITORED_GROUP)
    }

    pub fn trim_all(&self) -> Result<TrimStats> {
        let mut stats = self.trim_recent_jobs()?;
        stats.merge(self.trim_failed_jobs()?);
        stats.merge(self.trim_monitored_jobs()?);
        Ok(stats)
    }

    fn trim_group(&self, group: &'static str, indexes: &[IndexKind]) -> Result<TrimStats> {
        let started = Instant::now();
        let mut stats = TrimStats::default();

        for index in indexes {
            self.trim_index(*index, &mut stats)?;
        }

        self.metrics.entries_trimmed(stats.total());
        info!(
            group,
            evicted = stats.total(),
            records_deleted = stats.records_deleted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Trim finished"
        );
        Ok(stats)
    }

    fn trim_index(&self, index: IndexKind, stats: &mut TrimStats) -> Result<()> {
        let policy = self.retention.policy_for(index);
        let cutoff = self.clock.now_millis().saturating_sub(policy.max_age.as_millis());

        self.walk(index, |engine, key, indexed_at, pinned| {
            if pinned {
                return Ok(Step::Skip);
            }
            if indexed_at >= cutoff {
                return Ok(Step::Stop);
            }
            engine.evict(index, key, stats)?;
            Ok(Step::Continue)
        })?;

        if let Some(max_entries) = policy.max_entries {
            let max_entries = max_entries as u64;
            if self.count(index) > max_entries {
                // dropped dangling keys shrink the count too
                self.walk(index, |engine, key, _, pinned| {
                    if engine.count(index) <= max_entries {
                        return Ok(Step::Stop);
                    }
                    if pinned {
                        return Ok(Step::Skip);
                    }
                    engine.evict(index, key, stats)?;
                    Ok(Step::Continue)
                })?;
            }
        }
        Ok(())
    }

    /// Visit entries of `index` in ascending rank order, chunk by chunk
    fn walk<F>(&self, index: IndexKind, mut visit: F) -> Result<()>
    where
        F: FnMut(&Self, &[u8], i64, bool) -> Result<Step>,
    {
        let upper = Bound::Excluded(encode_index_upper_bound(index.as_str()));
        let mut lower = Bound::Included(encode_index_prefix(index.as_str()));

        loop {
            let chunk: Vec<KvPair> = self.store.range(
                Partition::Indexes,
                lower.clone(),
                upper.clone(),
                Direction::Ascending,
                TRIM_CHUNK,
            )?;
            let Some((last, _)) = chunk.last() else {
                return Ok(());
            };
            let next_lower = Bound::Excluded(last.clone());

            for (key, value) in &chunk {
                // unreadable entry values count as expired and unpinned
                let (indexed_at, pinned) = decode_index_entry(value).unwrap_or((i64::MIN, false));
                if visit(self, key, indexed_at, pinned)? == Step::Stop {
                    return Ok(());
                }
            }

            if chunk.len() < TRIM_CHUNK {
                return Ok(());
            }
            lower = next_lower;
        }
    }

    /// Remove one entry; returns true when a live membership was evicted
    fn evict(&self, index: IndexKind, key: &[u8], stats: &mut TrimStats) -> Result<bool> {
        let Some((_, rank, job_id)) = decode_index_key(key) else {
            warn!(%index, "Dropped undecodable index key");
            self.drop_key(index, key)?;
            return Ok(false);
        };

        let _guard = self.locks.lock(&job_id);
        match self.load(&job_id)? {
            Some(record) if record.memberships.get(&index) == Some(&rank) => {
                let mut mutation = self.mutation(record);
                mutation.unindex(index);
                let deleted = self.commit(mutation, &[], true)?;

                *stats.evicted.entry(index).or_default() += 1;
                if deleted {
                    stats.records_deleted += 1;
                }
                Ok(true)
            }
            _ => {
                // moved or deleted since the chunk was read
                if self.store.get(Partition::Indexes, key)?.is_some() {
                    warn!(job_id, %index, rank, "Dropped dangling index entry");
                    self.drop_key(index, key)?;
                }
                Ok(false)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Skip,
    Stop,
}
