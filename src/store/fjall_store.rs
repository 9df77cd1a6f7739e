use std::ops::Bound;
use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::error::Result;
use super::{BatchOp, Direction, KvPair, Partition, Store, WriteBatch};

/// Fjall-backed persistent storage for job records, indexes and metadata
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    indexes: PartitionHandle,
    metadata: PartitionHandle,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let jobs = keyspace.open_partition(Partition::Jobs.name(), PartitionCreateOptions::default())?;
        let indexes =
            keyspace.open_partition(Partition::Indexes.name(), PartitionCreateOptions::default())?;
        let metadata =
            keyspace.open_partition(Partition::Metadata.name(), PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self {
            keyspace,
            jobs,
            indexes,
            metadata,
        })
    }

    fn handle(&self, partition: Partition) -> &PartitionHandle {
        match partition {
            Partition::Jobs => &self.jobs,
            Partition::Indexes => &self.indexes,
            Partition::Metadata => &self.metadata,
        }
    }
}

impl Store for FjallStore {
    fn get(&self, partition: Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.handle(partition).get(key)?.map(|value| value.to_vec()))
    }

    fn range(
        &self,
        partition: Partition,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<KvPair>> {
        let iter = self.handle(partition).range((lower, upper));
        let mut results = Vec::with_capacity(limit.min(256));

        match direction {
            Direction::Ascending => {
                for item in iter.take(limit) {
                    let (key, value) = item?;
                    results.push((key.to_vec(), value.to_vec()));
                }
            }
            Direction::Descending => {
                for item in iter.rev().take(limit) {
                    let (key, value) = item?;
                    results.push((key.to_vec(), value.to_vec()));
                }
            }
        }

        Ok(results)
    }

    fn scan_prefix(&self, partition: Partition, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let mut results = Vec::new();
        for item in self.handle(partition).prefix(prefix) {
            let (key, value) = item?;
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let size = batch.len();
        let mut fjall_batch = self.keyspace.batch();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put {
                    partition,
                    key,
                    value,
                } => fjall_batch.insert(self.handle(partition), key, value),
                BatchOp::Delete { partition, key } => {
                    fjall_batch.remove(self.handle(partition), key)
                }
            }
        }
        fjall_batch.commit()?;

        debug!(size, "Committed write batch");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FjallStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallStore::open(temp_dir.path().join("test_ledger")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_open_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallStore::open(temp_dir.path().join("nested").join("ledger"));
        assert!(store.is_ok());
    }

    #[test]
    fn test_batch_put_and_get() {
        let (store, _temp) = create_test_store();

        let mut batch = WriteBatch::new();
        batch.put(Partition::Jobs, b"job:1".to_vec(), b"one".to_vec());
        batch.put(Partition::Indexes, b"ix:recent:1".to_vec(), b"x".to_vec());
        store.apply(batch).unwrap();

        assert_eq!(store.get(Partition::Jobs, b"job:1").unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.get(Partition::Indexes, b"ix:recent:1").unwrap(), Some(b"x".to_vec()));
        assert_eq!(store.get(Partition::Metadata, b"job:1").unwrap(), None);
    }

    #[test]
    fn test_batch_delete() {
        let (store, _temp) = create_test_store();

        let mut batch = WriteBatch::new();
        batch.put(Partition::Jobs, b"job:1".to_vec(), b"one".to_vec());
        store.apply(batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(Partition::Jobs, b"job:1".to_vec());
        store.apply(batch).unwrap();

        assert!(store.get(Partition::Jobs, b"job:1").unwrap().is_none());
    }

    #[test]
    fn test_range_both_directions() {
        let (store, _temp) = create_test_store();

        let mut batch = WriteBatch::new();
        for key in ["a:1", "a:2", "a:3", "b:1"] {
            batch.put(Partition::Indexes, key.as_bytes().to_vec(), Vec::new());
        }
        store.apply(batch).unwrap();

        let lower = Bound::Included(b"a:".to_vec());
        let upper = Bound::Excluded(b"a;".to_vec());

        let ascending = store
            .range(Partition::Indexes, lower.clone(), upper.clone(), Direction::Ascending, 2)
            .unwrap();
        assert_eq!(ascending.len(), 2);
        assert_eq!(ascending[0].0, b"a:1");

        let descending = store
            .range(Partition::Indexes, lower, upper, Direction::Descending, 10)
            .unwrap();
        let keys: Vec<_> = descending.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"a:3".to_vec(), b"a:2".to_vec(), b"a:1".to_vec()]);
    }

    #[test]
    fn test_scan_prefix() {
        let (store, _temp) = create_test_store();

        let mut batch = WriteBatch::new();
        batch.put(Partition::Metadata, b"tag:x".to_vec(), Vec::new());
        batch.put(Partition::Metadata, b"tag:y".to_vec(), Vec::new());
        batch.put(Partition::Metadata, b"meta:z".to_vec(), Vec::new());
        store.apply(batch).unwrap();

        assert_eq!(store.scan_prefix(Partition::Metadata, b"tag:").unwrap().len(), 2);
    }

    #[test]
    fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger");

        {
            let store = FjallStore::open(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch.put(Partition::Jobs, b"job:keep".to_vec(), b"v".to_vec());
            store.apply(batch).unwrap();
            store.persist().unwrap();
        }

        let store = FjallStore::open(&path).unwrap();
        assert_eq!(store.get(Partition::Jobs, b"job:keep").unwrap(), Some(b"v".to_vec()));
        assert!(store.health_check().is_ok());
    }
}
