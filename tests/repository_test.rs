use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use jobledger::repository::{
    Cursor, JobFailure, JobPayload, JobRepository, JobStatus, LedgerRepository, ManualClock,
    RepositoryOptions, TagMatcher,
};
use jobledger::store::{FjallStore, MemoryStore, Store};

fn payload(id: &str) -> JobPayload {
    JobPayload::builder()
        .id(id)
        .display_name("App\\Jobs\\SendWelcomeEmail")
        .build()
}

fn memory_repository() -> LedgerRepository {
    LedgerRepository::open(Arc::new(MemoryStore::new()), RepositoryOptions::default())
        .expect("Failed to open repository")
}

fn fjall_repository(dir: &TempDir) -> LedgerRepository {
    let store: Arc<dyn Store> =
        Arc::new(FjallStore::open(dir.path().join("ledger")).expect("Failed to open fjall store"));
    LedgerRepository::open(store, RepositoryOptions::default()).expect("Failed to open repository")
}

#[tokio::test]
async fn test_example_scenario() {
    let repo = memory_repository();
    let job = payload("A");

    repo.pushed("redis", "emails", &job).await.unwrap();
    assert_eq!(repo.count_pending(), 1);

    repo.reserved("redis", "emails", &job).await.unwrap();
    assert_eq!(repo.count_pending(), 0);

    repo.failed(
        JobFailure::new("Swift_TransportException: Connection refused", "#0 ..."),
        "redis",
        "emails",
        &job,
    )
    .await
    .unwrap();
    repo.completed(&job, true, false).await.unwrap();

    assert_eq!(repo.count_failed(), 1);
    assert_eq!(repo.count_recently_failed(), 1);
    assert_eq!(repo.count_completed(), 0);

    let failed = repo.find_failed("A").await.unwrap().unwrap();
    assert_eq!(
        failed.failure.unwrap().message,
        "Swift_TransportException: Connection refused"
    );
}

#[tokio::test]
async fn test_push_then_appears_in_pending() {
    let repo = memory_repository();
    let before = repo.count_pending();

    repo.pushed("redis", "default", &payload("42")).await.unwrap();

    assert_eq!(repo.count_pending(), before + 1);
    let page = repo.get_pending(None, None).await.unwrap();
    assert!(page.jobs.iter().any(|job| job.id == "42"));
}

#[tokio::test]
async fn test_reserve_then_complete_moves_to_completed() {
    let repo = memory_repository();
    repo.pushed("redis", "default", &payload("1")).await.unwrap();
    let pending = repo.count_pending();
    let completed = repo.count_completed();

    repo.reserved("redis", "default", &payload("1")).await.unwrap();
    repo.completed(&payload("1"), false, false).await.unwrap();

    assert_eq!(repo.count_pending(), pending - 1);
    assert_eq!(repo.count_completed(), completed + 1);
    let pending_page = repo.get_pending(None, None).await.unwrap();
    assert!(pending_page.jobs.is_empty());
    let completed_page = repo.get_completed(None, None).await.unwrap();
    assert_eq!(completed_page.jobs[0].status, JobStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pushes_get_distinct_ids() {
    let repo = memory_repository();
    let n = 200;

    let mut handles = Vec::with_capacity(n);
    for _ in 0..n {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            let anonymous = JobPayload::builder().id("").display_name("Job").build();
            repo.pushed("redis", "default", &anonymous).await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap());
    }

    assert_eq!(ids.len(), n);
    assert_eq!(repo.total_recent(), n as u64);
    assert_eq!(repo.count_recent(), n as u64);
    assert_eq!(repo.count_pending(), n as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transitions_on_same_job_stay_consistent() {
    let repo = memory_repository();
    repo.pushed("redis", "default", &payload("hot")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..50 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                repo.reserved("redis", "default", &payload("hot")).await
            } else {
                repo.released("redis", "default", &payload("hot")).await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // at most one pending entry, matching the final status
    let pending = repo.count_pending();
    assert!(pending <= 1);
    let page = repo.get_pending(None, None).await.unwrap();
    assert_eq!(page.jobs.len() as u64, pending);
    assert_eq!(repo.count_recent(), 1);
    assert_eq!(repo.total_recent(), 1);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let repo = fjall_repository(&dir);
        repo.pushed("redis", "default", &payload("1")).await.unwrap();
        repo.pushed("redis", "default", &payload("2")).await.unwrap();
        repo.reserved("redis", "default", &payload("2")).await.unwrap();
        repo.failed(JobFailure::new("boom", ""), "redis", "default", &payload("2"))
            .await
            .unwrap();
        repo.monitor("vip").await.unwrap();
        // "1" and "2" were pushed by the caller
        let id = repo.next_job_id().await.unwrap();
        assert_eq!(id, "3");
        repo.persist().await.unwrap();
    }

    let repo = fjall_repository(&dir);
    assert_eq!(repo.count_recent(), 2);
    assert_eq!(repo.count_pending(), 1);
    assert_eq!(repo.count_failed(), 1);
    assert_eq!(repo.total_recent(), 2);
    assert_eq!(repo.total_failed(), 1);
    assert_eq!(repo.monitored_tags(), vec!["vip".to_string()]);

    assert_eq!(repo.next_job_id().await.unwrap(), "4");

    // new entries sort ahead of the recovered ones
    repo.pushed("redis", "default", &payload("9")).await.unwrap();
    let page = repo.get_recent(None).await.unwrap();
    assert_eq!(page.jobs[0].id, "9");
    assert_eq!(page.jobs.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counters_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let n = 64;

    let (total_recent, total_failed, last_id) = {
        let repo = fjall_repository(&dir);
        let mut handles = Vec::with_capacity(n);
        for i in 0..n {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let job = payload(&format!("job-{i}"));
                repo.pushed("redis", "default", &job).await?;
                repo.reserved("redis", "default", &job).await?;
                repo.failed(JobFailure::new("boom", ""), "redis", "default", &job)
                    .await?;
                repo.next_job_id().await
            }));
        }

        let mut last_id = 0u64;
        for handle in handles {
            let id: u64 = handle.await.unwrap().unwrap().parse().unwrap();
            last_id = last_id.max(id);
        }
        repo.persist().await.unwrap();
        (repo.total_recent(), repo.total_failed(), last_id)
    };
    assert_eq!(total_recent, n as u64);
    assert_eq!(total_failed, n as u64);

    let repo = fjall_repository(&dir);
    assert_eq!(repo.total_recent(), total_recent);
    assert_eq!(repo.total_failed(), total_failed);
    let next: u64 = repo.next_job_id().await.unwrap().parse().unwrap();
    assert!(next > last_id);
}

#[tokio::test]
async fn test_totals_never_decrease_when_trimmed() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let repo = LedgerRepository::open(
        Arc::new(MemoryStore::new()),
        RepositoryOptions::default().with_clock(clock.clone()),
    )
    .unwrap();

    for id in ["1", "2", "3"] {
        repo.pushed("redis", "default", &payload(id)).await.unwrap();
        repo.reserved("redis", "default", &payload(id)).await.unwrap();
        repo.failed(JobFailure::new("boom", ""), "redis", "default", &payload(id))
            .await
            .unwrap();
    }
    clock.advance(Duration::from_secs(8 * 24 * 60 * 60));

    repo.trim_recent_jobs().await.unwrap();
    let stats = repo.trim_failed_jobs().await.unwrap();

    assert_eq!(stats.records_deleted, 3);
    assert_eq!(repo.count_failed(), 0);
    assert_eq!(repo.count_recent(), 0);
    assert_eq!(repo.total_failed(), 3);
    assert_eq!(repo.total_recent(), 3);
}

#[tokio::test]
async fn test_remembered_job_outlives_monitored_trim() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let repo = LedgerRepository::open(
        Arc::new(MemoryStore::new()),
        RepositoryOptions::default().with_clock(clock.clone()),
    )
    .unwrap();

    repo.remember("redis", "default", &payload("X")).await.unwrap();
    clock.advance(Duration::from_secs(365 * 24 * 60 * 60));

    repo.trim_monitored_jobs().await.unwrap();
    repo.trim_recent_jobs().await.unwrap();
    let page = repo.get_monitored(None).await.unwrap();
    assert_eq!(page.jobs.len(), 1);

    assert_eq!(repo.delete_monitored(&["X".to_string()]).await.unwrap(), 1);
    assert!(repo.get_monitored(None).await.unwrap().jobs.is_empty());
}

#[tokio::test]
async fn test_pagination_yields_every_job_once() {
    let repo = LedgerRepository::open(
        Arc::new(MemoryStore::new()),
        RepositoryOptions::default().with_page_size(3),
    )
    .unwrap();
    for i in 0..20 {
        repo.pushed("redis", "default", &payload(&format!("job-{i}"))).await.unwrap();
    }

    let mut seen = Vec::new();
    let mut after: Option<Cursor> = None;
    loop {
        let page = repo.get_recent(after.clone()).await.unwrap();
        seen.extend(page.jobs.into_iter().map(|job| job.id));
        match page.next {
            Some(next) => after = Some(next),
            None => break,
        }
    }

    assert_eq!(seen.len(), 20);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 20);
    assert_eq!(seen.first().map(String::as_str), Some("job-19"));
}

#[tokio::test]
async fn test_tag_matcher_searches_by_tag() {
    let repo = LedgerRepository::open(
        Arc::new(MemoryStore::new()),
        RepositoryOptions::default().with_matcher(Arc::new(TagMatcher)),
    )
    .unwrap();
    let tagged = JobPayload::builder()
        .id("1")
        .display_name("App\\Jobs\\EncodePodcast")
        .tags(vec!["podcast:7".to_string()])
        .build();
    repo.pushed("redis", "default", &tagged).await.unwrap();
    repo.pushed("redis", "default", &payload("2")).await.unwrap();

    let page = repo.get_pending(None, Some("podcast:7".to_string())).await.unwrap();
    assert_eq!(page.jobs.len(), 1);
    assert_eq!(page.jobs[0].id, "1");

    // names are not matched in tag mode
    let page = repo.get_pending(None, Some("podcast".to_string())).await.unwrap();
    assert!(page.jobs.is_empty());
}
