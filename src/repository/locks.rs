//! Per-job mutual exclusion via lock striping

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_STRIPES: usize = 64;

/// Fixed pool of mutexes addressed by job ID hash
///
/// Two operations on the same job always take the same stripe. Operations on
/// different jobs contend only on a hash collision.
#[derive(Debug)]
pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    pub fn new(stripes: usize) -> Self {
        let stripes = stripes.max(1);
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn stripe_of(&self, job_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        job_id.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Lock the stripe owning `job_id`
    ///
    /// The guarded data is `()`, so a poisoned stripe is still usable.
    pub fn lock(&self, job_id: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(job_id)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StripedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
