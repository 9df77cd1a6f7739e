//! Periodic background trimming

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::repository::LedgerRepository;

/// Spawn a task trimming every index each `interval` until `shutdown` flips
///
/// A failed pass is logged and retried on the next tick.
pub fn spawn(
    repository: LedgerRepository,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;

        info!(interval_ms = interval.as_millis() as u64, "Trimmer started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match repository.trim_all().await {
                        Ok(stats) => debug!(evicted = stats.total(), "Periodic trim pass"),
                        Err(err) => warn!(error = %err, "Periodic trim failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Trimmer stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::repository::{
        JobPayload, JobRepository, ManualClock, RepositoryOptions,
    };
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_trimmer_evicts_and_stops() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let options = RepositoryOptions::default().with_clock(clock.clone());
        let repo = LedgerRepository::open(Arc::new(MemoryStore::new()), options).unwrap();

        let payload = JobPayload::builder().id("1").display_name("Job").build();
        repo.pushed("redis", "default", &payload).await.unwrap();
        clock.advance(Duration::from_secs(2 * 60 * 60));

        let (tx, rx) = watch::channel(false);
        let handle = spawn(repo.clone(), Duration::from_millis(10), rx);

        for _ in 0..200 {
            if repo.count_recent() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(repo.count_recent(), 0);
        assert_eq!(repo.total_recent(), 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
