//! Index bookkeeping: counters and per-job mutations.
//!
//! A [`Mutation`] collects every change one lifecycle event makes to a job:
//! the record itself, index keys added or removed, and counter deltas. It is
//! turned into a single [`WriteBatch`] so the record and its index entries
//! land atomically. Counters track the number of index keys per index and
//! are adjusted only after that batch commits.

use std::sync::atomic::{AtomicU64, Ordering};

use super::models::{IndexKind, JobRecord};
use crate::store::partitions::{encode_index_entry, encode_index_key, encode_job_key};
use crate::store::{Partition, WriteBatch};

fn slot(index: IndexKind) -> usize {
    match index {
        IndexKind::Recent => 0,
        IndexKind::Pending => 1,
        IndexKind::Completed => 2,
        IndexKind::Silenced => 3,
        IndexKind::Failed => 4,
        IndexKind::RecentFailed => 5,
        IndexKind::Monitored => 6,
    }
}

/// Signed per-index size changes produced by one mutation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deltas {
    sizes: [i64; 7],
}

impl Deltas {
    pub fn add(&mut self, index: IndexKind, delta: i64) {
        self.sizes[slot(index)] += delta;
    }

    pub fn get(&self, index: IndexKind) -> i64 {
        self.sizes[slot(index)]
    }
}

/// In-memory index sizes and lifetime totals
#[derive(Debug, Default)]
pub struct Counters {
    sizes: [AtomicU64; 7],
    pub total_recent: AtomicU64,
    pub total_failed: AtomicU64,
}

impl Counters {
    pub fn get(&self, index: IndexKind) -> u64 {
        self.sizes[slot(index)].load(Ordering::Acquire)
    }

    pub fn set(&self, index: IndexKind, value: u64) {
        self.sizes[slot(index)].store(value, Ordering::Release);
    }

    pub fn apply(&self, deltas: &Deltas) {
        for index in IndexKind::ALL {
            let delta = deltas.get(index);
            if delta != 0 {
                let _ = self.sizes[slot(index)].fetch_update(
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    |size| Some(size.saturating_add_signed(delta)),
                );
            }
        }
    }
}

/// Pending changes to one job record and its index entries
pub struct Mutation<'a> {
    pub record: JobRecord,
    ranks: &'a AtomicU64,
    now_ms: i64,
    batch: WriteBatch,
    deltas: Deltas,
}

/// Result of turning a mutation into a batch
pub struct Prepared {
    pub batch: WriteBatch,
    pub deltas: Deltas,
    pub deleted: bool,
}

impl<'a> Mutation<'a> {
    pub fn new(record: JobRecord, ranks: &'a AtomicU64, now_ms: i64) -> Self {
        Self {
            record,
            ranks,
            now_ms,
            batch: WriteBatch::new(),
            deltas: Deltas::default(),
        }
    }

    /// Extra write committed in the same batch
    pub fn put(&mut self, partition: Partition, key: Vec<u8>, value: Vec<u8>) {
        self.batch.put(partition, key, value);
    }

    /// Add the job to `index` unless it is already a member
    ///
    /// Returns true when a new entry was created.
    pub fn ensure(&mut self, index: IndexKind) -> bool {
        if self.record.is_member_of(index) {
            return false;
        }
        self.insert(index, false);
        true
    }

    /// Replace the job's entry in `index` with a fresh one at the head
    pub fn reindex(&mut self, index: IndexKind, pinned: bool) {
        self.unindex(index);
        self.insert(index, pinned);
    }

    /// Remove the job from `index`; returns false when it was not a member
    pub fn unindex(&mut self, index: IndexKind) -> bool {
        match self.record.memberships.remove(&index) {
            Some(rank) => {
                self.batch.delete(
                    Partition::Indexes,
                    encode_index_key(index.as_str(), rank, &self.record.id),
                );
                self.deltas.add(index, -1);
                true
            }
            None => false,
        }
    }

    pub fn unindex_all(&mut self) {
        let indexes: Vec<_> = self.record.memberships.keys().copied().collect();
        for index in indexes {
            self.unindex(index);
        }
    }

    fn insert(&mut self, index: IndexKind, pinned: bool) {
        let rank = self.ranks.fetch_add(1, Ordering::SeqCst);
        self.batch.put(
            Partition::Indexes,
            encode_index_key(index.as_str(), rank, &self.record.id),
            encode_index_entry(self.now_ms, pinned),
        );
        self.record.memberships.insert(index, rank);
        self.deltas.add(index, 1);
    }

    /// Finish the mutation
    ///
    /// A record left without index memberships is deleted when
    /// `delete_orphan` is set; otherwise it is written back.
    pub fn prepare(self, delete_orphan: bool) -> serde_json::Result<Prepared> {
        let Mutation {
            record,
            mut batch,
            deltas,
            ..
        } = self;

        let key = encode_job_key(&record.id);
        let deleted = delete_orphan && record.memberships.is_empty();
        if deleted {
            batch.delete(Partition::Jobs, key);
        } else {
            batch.put(Partition::Jobs, key, serde_json::to_vec(&record)?);
        }

        Ok(Prepared {
            batch,
            deltas,
            deleted,
        })
    }
}
