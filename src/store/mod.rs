/// Keyed persistence for job records, indexes and metadata
///
/// The repository engine talks to storage only through the [`Store`] trait,
/// so the backend is chosen at construction time:
///
/// - [`FjallStore`]: embedded LSM keyspace, one partition per [`Partition`]
/// - [`MemoryStore`]: ordered maps behind a lock, for tests and ephemeral use
///
/// All multi-key mutations go through [`WriteBatch`], which both backends
/// apply atomically. Key layout lives in [`partitions`].
///
/// ## Usage
///
/// ```rust,ignore
/// use jobledger::store::{FjallStore, Partition, Store, WriteBatch};
///
/// let store = FjallStore::open("data/ledger")?;
/// let mut batch = WriteBatch::new();
/// batch.put(Partition::Metadata, b"meta:k".to_vec(), b"v".to_vec());
/// store.apply(batch)?;
/// ```
use std::ops::Bound;

pub mod error;
pub mod fjall_store;
pub mod memory;
pub mod partitions;

pub use fjall_store::FjallStore;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;

pub type KvPair = (Vec<u8>, Vec<u8>);

/// Logical partitions of the keyspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    Jobs,
    Indexes,
    Metadata,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Jobs, Partition::Indexes, Partition::Metadata];

    pub fn name(&self) -> &'static str {
        match self {
            Partition::Jobs => "jobs",
            Partition::Indexes => "indexes",
            Partition::Metadata => "metadata",
        }
    }
}

/// Iteration order for range reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put {
        partition: Partition,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        partition: Partition,
        key: Vec<u8>,
    },
}

/// Ordered list of writes committed as one atomic unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, partition: Partition, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            partition,
            key,
            value,
        });
    }

    pub fn delete(&mut self, partition: Partition, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { partition, key });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Backing store capability required by the repository
///
/// Implementations must be safe to share between threads; every method may
/// be called concurrently. `apply` must be all-or-nothing.
pub trait Store: Send + Sync {
    /// Point lookup
    fn get(&self, partition: Partition, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Read up to `limit` pairs within `(lower, upper)` in the given order
    fn range(
        &self,
        partition: Partition,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<KvPair>>;

    /// Read every pair whose key starts with `prefix`, ascending
    fn scan_prefix(&self, partition: Partition, prefix: &[u8]) -> Result<Vec<KvPair>>;

    /// Commit a batch atomically
    fn apply(&self, batch: WriteBatch) -> Result<()>;

    /// Flush pending writes to durable storage
    fn persist(&self) -> Result<()>;

    /// Verify the store is readable
    fn health_check(&self) -> Result<()> {
        self.get(Partition::Metadata, b"meta:health").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_batch_preserves_order() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        batch.put(Partition::Jobs, b"job:1".to_vec(), b"{}".to_vec());
        batch.delete(Partition::Indexes, b"ix:recent:1".to_vec());
        assert_eq!(batch.len(), 2);

        let ops = batch.into_ops();
        assert!(matches!(ops[0], BatchOp::Put { partition: Partition::Jobs, .. }));
        assert!(matches!(ops[1], BatchOp::Delete { partition: Partition::Indexes, .. }));
    }

    #[test]
    fn test_partition_names_are_distinct() {
        let names: std::collections::HashSet<_> = Partition::ALL.iter().map(Partition::name).collect();
        assert_eq!(names.len(), Partition::ALL.len());
    }
}
