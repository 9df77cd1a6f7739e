use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use super::error::{Result, StoreError};
use super::{BatchOp, Direction, KvPair, Partition, Store, WriteBatch};

type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-process store backed by ordered maps
///
/// A single lock guards all partitions, so a batch is applied atomically
/// with respect to every reader. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<Partition, Tree>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, partition: Partition, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        Ok(partitions
            .get(&partition)
            .and_then(|tree| tree.get(key))
            .cloned())
    }

    fn range(
        &self,
        partition: Partition,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<KvPair>> {
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        let Some(tree) = partitions.get(&partition) else {
            return Ok(Vec::new());
        };

        // BTreeMap::range panics on inverted bounds
        if let (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) =
            (&lower, &upper)
        {
            let empty = match (&lower, &upper) {
                (Bound::Included(_), Bound::Included(_)) => lo > hi,
                _ => lo >= hi,
            };
            if empty {
                return Ok(Vec::new());
            }
        }

        let iter = tree.range::<Vec<u8>, _>((lower, upper));
        let results = match direction {
            Direction::Ascending => iter
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Direction::Descending => iter
                .rev()
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Ok(results)
    }

    fn scan_prefix(&self, partition: Partition, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let partitions = self.partitions.read().map_err(|_| StoreError::Poisoned)?;
        let Some(tree) = partitions.get(&partition) else {
            return Ok(Vec::new());
        };

        Ok(tree
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, batch: WriteBatch) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(|_| StoreError::Poisoned)?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put {
                    partition,
                    key,
                    value,
                } => {
                    partitions.entry(partition).or_default().insert(key, value);
                }
                BatchOp::Delete { partition, key } => {
                    if let Some(tree) = partitions.get_mut(&partition) {
                        tree.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        for key in ["ix:a:1", "ix:a:2", "ix:a:3", "ix:b:1"] {
            batch.put(Partition::Indexes, key.as_bytes().to_vec(), Vec::new());
        }
        store.apply(batch).unwrap();
        store
    }

    #[test]
    fn test_get_missing_partition() {
        let store = MemoryStore::new();
        assert!(store.get(Partition::Jobs, b"job:1").unwrap().is_none());
        assert!(store.scan_prefix(Partition::Jobs, b"job:").unwrap().is_empty());
    }

    #[test]
    fn test_range_descending_with_limit() {
        let store = seeded();
        let pairs = store
            .range(
                Partition::Indexes,
                Bound::Included(b"ix:a:".to_vec()),
                Bound::Excluded(b"ix:a;".to_vec()),
                Direction::Descending,
                2,
            )
            .unwrap();
        let keys: Vec<_> = pairs.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"ix:a:3".to_vec(), b"ix:a:2".to_vec()]);
    }

    #[test]
    fn test_range_inverted_bounds_is_empty() {
        let store = seeded();
        let pairs = store
            .range(
                Partition::Indexes,
                Bound::Included(b"ix:a:3".to_vec()),
                Bound::Excluded(b"ix:a:1".to_vec()),
                Direction::Ascending,
                10,
            )
            .unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_scan_prefix_stops_at_boundary() {
        let store = seeded();
        assert_eq!(store.scan_prefix(Partition::Indexes, b"ix:a:").unwrap().len(), 3);
        assert_eq!(store.scan_prefix(Partition::Indexes, b"ix:b:").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_in_batch() {
        let store = seeded();
        let mut batch = WriteBatch::new();
        batch.delete(Partition::Indexes, b"ix:a:2".to_vec());
        batch.delete(Partition::Jobs, b"job:none".to_vec());
        store.apply(batch).unwrap();

        assert!(store.get(Partition::Indexes, b"ix:a:2").unwrap().is_none());
        assert_eq!(store.scan_prefix(Partition::Indexes, b"ix:a:").unwrap().len(), 2);
    }
}
