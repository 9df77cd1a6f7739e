use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::error::{RepositoryError, Result};
use super::indexes::{Counters, Deltas, Mutation, Prepared};
use super::locks::StripedLocks;
use super::models::{IndexKind, JobRecord, RepositoryStats};
use super::query::JobMatcher;
use super::{Clock, RepositoryOptions};
use crate::config::RetentionConfig;
use crate::observability::Metrics;
use crate::store::partitions::{
    decode_counter, decode_index_key, decode_job_key, decode_tag_key, encode_counter,
    encode_job_key, encode_meta_key, encode_tag_key, job_prefix, tag_prefix,
};
use crate::store::{Partition, Store, WriteBatch};

pub(crate) const META_JOB_ID: &str = "job_id";
pub(crate) const META_TOTAL_RECENT: &str = "total_recent";
pub(crate) const META_TOTAL_FAILED: &str = "total_failed";

/// Lifetime total bumped by a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Total {
    Recent,
    Failed,
}

/// Synchronous core shared by every repository operation
///
/// All methods block on the store; the async [`super::LedgerRepository`]
/// runs them on the blocking pool under a timeout.
pub struct Engine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) matcher: Arc<dyn JobMatcher>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) retention: RetentionConfig,
    pub(crate) page_size: usize,
    pub(crate) locks: StripedLocks,
    pub(crate) counters: Counters,
    ranks: AtomicU64,
    job_ids: AtomicU64,
    /// Serializes writes of `meta:*` counters so stored values only grow
    meta: Mutex<()>,
    monitored_tags: RwLock<BTreeSet<String>>,
}

impl Engine {
    /// Open the engine over `store`, rebuilding counters and sequences
    ///
    /// Index sizes and the rank sequence are recomputed from the index
    /// partition; the job-id sequence resumes after both the persisted value
    /// and the largest numeric ID still stored.
    pub fn open(store: Arc<dyn Store>, options: &RepositoryOptions) -> Result<Self> {
        let counters = Counters::default();
        let mut sizes = [0u64; 7];
        let mut next_rank = 0u64;

        for (key, _) in store.scan_prefix(Partition::Indexes, b"ix:")? {
            let Some((index, rank, _)) = decode_index_key(&key) else {
                continue;
            };
            let Ok(index) = index.parse::<IndexKind>() else {
                continue;
            };
            let slot = IndexKind::ALL.iter().position(|k| *k == index).unwrap_or(0);
            sizes[slot] += 1;
            next_rank = next_rank.max(rank + 1);
        }
        for (slot, index) in IndexKind::ALL.into_iter().enumerate() {
            counters.set(index, sizes[slot]);
        }

        let mut last_job_id = read_counter(store.as_ref(), META_JOB_ID)?.unwrap_or(0);
        for (key, _) in store.scan_prefix(Partition::Jobs, &job_prefix())? {
            if let Some(id) = decode_job_key(&key).and_then(|id| id.parse::<u64>().ok()) {
                last_job_id = last_job_id.max(id);
            }
        }

        let total_recent = read_counter(store.as_ref(), META_TOTAL_RECENT)?
            .unwrap_or(0)
            .max(counters.get(IndexKind::Recent));
        let total_failed = read_counter(store.as_ref(), META_TOTAL_FAILED)?
            .unwrap_or(0)
            .max(counters.get(IndexKind::Failed));
        counters.total_recent.store(total_recent, Ordering::SeqCst);
        counters.total_failed.store(total_failed, Ordering::SeqCst);

        let tags: BTreeSet<String> = store
            .scan_prefix(Partition::Metadata, &tag_prefix())?
            .into_iter()
            .filter_map(|(key, _)| decode_tag_key(&key))
            .collect();

        info!(
            recent = counters.get(IndexKind::Recent),
            pending = counters.get(IndexKind::Pending),
            failed = counters.get(IndexKind::Failed),
            monitored_tags = tags.len(),
            next_rank,
            last_job_id,
            "Job ledger opened"
        );

        Ok(Self {
            store,
            clock: Arc::clone(&options.clock),
            matcher: Arc::clone(&options.matcher),
            metrics: Arc::clone(&options.metrics),
            retention: options.retention.clone(),
            page_size: options.page_size.max(1),
            locks: StripedLocks::new(options.lock_stripes),
            counters,
            ranks: AtomicU64::new(next_rank),
            job_ids: AtomicU64::new(last_job_id),
            meta: Mutex::new(()),
            monitored_tags: RwLock::new(tags),
        })
    }

    /// Assign the next job ID
    pub fn next_job_id(&self) -> Result<String> {
        let _meta = self.lock_meta();
        let id = self.job_ids.fetch_add(1, Ordering::SeqCst) + 1;

        let mut batch = WriteBatch::new();
        batch.put(Partition::Metadata, encode_meta_key(META_JOB_ID), encode_counter(id));
        self.store.apply(batch)?;

        Ok(id.to_string())
    }

    /// Draw job IDs until one has no stored record, returning it locked
    ///
    /// Callers may push numeric IDs of their own, so a drawn ID can already
    /// be taken.
    pub(crate) fn claim_job_id(&self) -> Result<(String, MutexGuard<'_, ()>)> {
        loop {
            let id = self.next_job_id()?;
            let guard = self.locks.lock(&id);
            if self.store.get(Partition::Jobs, &encode_job_key(&id))?.is_none() {
                return Ok((id, guard));
            }
            debug!(job_id = %id, "Drawn job ID already taken");
        }
    }

    fn lock_meta(&self) -> MutexGuard<'_, ()> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a record, treating undecodable bytes as absent
    pub(crate) fn load(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let Some(bytes) = self.store.get(Partition::Jobs, &encode_job_key(job_id))? else {
            return Ok(None);
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(job_id, error = %err, "Corrupt job record treated as absent");
                self.metrics.entry_healed();
                Ok(None)
            }
        }
    }

    pub(crate) fn mutation(&self, record: JobRecord) -> Mutation<'_> {
        Mutation::new(record, &self.ranks, self.clock.now_millis())
    }

    /// Commit a mutation and adjust counters
    ///
    /// Must be called while holding the job's stripe lock. Lifetime totals
    /// and a caller-supplied numeric ID above the sequence are written under
    /// the meta lock, so their stored values never go backwards.
    pub(crate) fn commit(
        &self,
        mut mutation: Mutation<'_>,
        totals: &[Total],
        delete_orphan: bool,
    ) -> Result<bool> {
        let numeric_id = mutation.record.id.parse::<u64>().ok();
        let raises_job_id = numeric_id.is_some_and(|id| id > self.job_ids.load(Ordering::SeqCst));
        let _meta = (!totals.is_empty() || raises_job_id).then(|| self.lock_meta());

        if let Some(id) = numeric_id.filter(|_| raises_job_id) {
            if self.job_ids.fetch_max(id, Ordering::SeqCst) < id {
                mutation.put(Partition::Metadata, encode_meta_key(META_JOB_ID), encode_counter(id));
            }
        }

        let mut reserved = Vec::with_capacity(totals.len());
        for total in totals {
            let (counter, key) = self.total(*total);
            let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
            mutation.put(Partition::Metadata, encode_meta_key(key), encode_counter(value));
            reserved.push(counter);
        }

        let applied = mutation
            .prepare(delete_orphan)
            .map_err(RepositoryError::from)
            .and_then(|Prepared { batch, deltas, deleted }| {
                self.store.apply(batch)?;
                Ok((deltas, deleted))
            });

        match applied {
            Ok((deltas, deleted)) => {
                self.counters.apply(&deltas);
                Ok(deleted)
            }
            Err(err) => {
                for counter in reserved {
                    counter.fetch_sub(1, Ordering::SeqCst);
                }
                Err(err)
            }
        }
    }

    fn total(&self, total: Total) -> (&AtomicU64, &'static str) {
        match total {
            Total::Recent => (&self.counters.total_recent, META_TOTAL_RECENT),
            Total::Failed => (&self.counters.total_failed, META_TOTAL_FAILED),
        }
    }

    /// Drop an index entry that no longer matches its record
    ///
    /// Re-checks under the job lock so a concurrent writer that just moved
    /// the entry is not mistaken for corruption.
    pub(crate) fn heal_entry(&self, index: IndexKind, key: &[u8], rank: u64, job_id: &str) -> Result<bool> {
        let _guard = self.locks.lock(job_id);

        if self.store.get(Partition::Indexes, key)?.is_none() {
            return Ok(false);
        }
        if let Some(record) = self.load(job_id)? {
            if record.memberships.get(&index) == Some(&rank) {
                return Ok(false);
            }
        }

        self.drop_key(index, key)?;
        warn!(job_id, %index, rank, "Dropped dangling index entry");
        Ok(true)
    }

    /// Delete an index key outright, keeping the counter in step
    pub(crate) fn drop_key(&self, index: IndexKind, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(Partition::Indexes, key.to_vec());
        self.store.apply(batch)?;

        let mut deltas = Deltas::default();
        deltas.add(index, -1);
        self.counters.apply(&deltas);
        self.metrics.entry_healed();
        Ok(())
    }

    pub fn count(&self, index: IndexKind) -> u64 {
        self.counters.get(index)
    }

    pub fn total_recent(&self) -> u64 {
        self.counters.total_recent.load(Ordering::SeqCst)
    }

    pub fn total_failed(&self) -> u64 {
        self.counters.total_failed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> RepositoryStats {
        RepositoryStats {
            recent: self.count(IndexKind::Recent),
            pending: self.count(IndexKind::Pending),
            completed: self.count(IndexKind::Completed),
            silenced: self.count(IndexKind::Silenced),
            failed: self.count(IndexKind::Failed),
            recently_failed: self.count(IndexKind::RecentFailed),
            monitored: self.count(IndexKind::Monitored),
            total_recent: self.total_recent(),
            total_failed: self.total_failed(),
        }
    }

    pub fn monitor(&self, tag: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(Partition::Metadata, encode_tag_key(tag), Vec::new());
        self.store.apply(batch)?;

        self.monitored_tags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag.to_string());
        info!(tag, "Monitoring tag");
        Ok(())
    }

    pub fn stop_monitoring(&self, tag: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(Partition::Metadata, encode_tag_key(tag));
        self.store.apply(batch)?;

        self.monitored_tags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tag);
        info!(tag, "Stopped monitoring tag");
        Ok(())
    }

    pub fn monitored_tags(&self) -> Vec<String> {
        self.monitored_tags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub(crate) fn is_monitored(&self, tags: &[String]) -> bool {
        let monitored = self
            .monitored_tags
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        !monitored.is_empty() && tags.iter().any(|tag| monitored.contains(tag))
    }

    pub fn persist(&self) -> Result<()> {
        self.store.persist()?;
        Ok(())
    }

    pub fn health_check(&self) -> Result<()> {
        self.store.health_check()?;
        Ok(())
    }
}

fn read_counter(store: &dyn Store, key: &str) -> Result<Option<u64>> {
    Ok(store
        .get(Partition::Metadata, &encode_meta_key(key))?
        .and_then(|bytes| decode_counter(&bytes)))
}
