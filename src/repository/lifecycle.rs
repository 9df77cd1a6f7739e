//! Lifecycle transitions: `pushed`, `reserved`, `released`, `remember`,
//! `completed`, `failed` and the retry/deletion operations around them.
//!
//! Each transition runs under the job's stripe lock: load the record, check
//! the transition against its current status, compute index effects into a
//! [`Mutation`] and commit it as one batch. Out-of-order events are logged
//! and applied anyway so the stored state always follows the latest report.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use super::engine::{Engine, Total};
use super::error::Result;
use super::indexes::Mutation;
use super::models::{
    IndexKind, JobFailure, JobPayload, JobRecord, JobStatus, RetryAttempt, RetryStatus,
};

/// Lifecycle event reported by the queue dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Push,
    Reserve,
    Release,
    Complete,
    Fail,
    Remember,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Push => "push",
            Transition::Reserve => "reserve",
            Transition::Release => "release",
            Transition::Complete => "complete",
            Transition::Fail => "fail",
            Transition::Remember => "remember",
        }
    }

    fn accepts(&self, from: Option<JobStatus>) -> bool {
        use JobStatus::*;

        match self {
            Transition::Push => matches!(from, None | Some(Pending) | Some(Reserved)),
            Transition::Reserve => matches!(from, Some(Pending) | Some(Reserved)),
            Transition::Release => matches!(from, Some(Reserved) | Some(Pending)),
            Transition::Complete => matches!(from, Some(Reserved) | Some(Completed)),
            Transition::Fail => matches!(from, Some(Reserved) | Some(Failed)),
            Transition::Remember => true,
        }
    }

    /// Check the transition from the job's current status
    pub fn validate(
        self,
        job_id: &str,
        from: Option<JobStatus>,
    ) -> std::result::Result<(), InvalidTransition> {
        if self.accepts(from) {
            Ok(())
        } else {
            Err(InvalidTransition {
                job_id: job_id.to_string(),
                transition: self,
                from,
            })
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {transition} job {job_id} from {}", .from.map(|s| s.as_str()).unwrap_or("absent"))]
pub struct InvalidTransition {
    pub job_id: String,
    pub transition: Transition,
    pub from: Option<JobStatus>,
}

/// Connection and queue a report came from, when known
type Route<'a> = Option<(&'a str, &'a str)>;

impl Engine {
    /// Record a newly dispatched job
    ///
    /// A payload without an ID is assigned the next unused one from
    /// [`Engine::next_job_id`]. Returns the job ID.
    pub fn pushed(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<String> {
        let mut payload = payload.clone();
        let _guard = if payload.id.is_empty() {
            let (id, guard) = self.claim_job_id()?;
            payload.id = id;
            guard
        } else {
            self.locks.lock(&payload.id)
        };
        let (mut mutation, created) =
            self.begin(Transition::Push, Some((connection, queue)), &payload)?;

        mutation.record.status = JobStatus::Pending;
        mutation.reindex(IndexKind::Recent, false);
        mutation.ensure(IndexKind::Pending);
        mutation.unindex(IndexKind::Completed);
        mutation.unindex(IndexKind::Silenced);
        if self.is_monitored(&payload.tags) {
            mutation.ensure(IndexKind::Monitored);
        }

        self.finish(mutation, created, &[])?;
        self.metrics.job_pushed();
        debug!(job_id = %payload.id, connection, queue, created, "Job pushed");
        Ok(payload.id)
    }

    pub fn reserved(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<()> {
        let _guard = self.locks.lock(&payload.id);
        let (mut mutation, created) =
            self.begin(Transition::Reserve, Some((connection, queue)), payload)?;

        mutation.record.status = JobStatus::Reserved;
        mutation.record.reserved_at = Some(self.clock.now());
        mutation.unindex(IndexKind::Pending);
        mutation.unindex(IndexKind::Completed);
        mutation.unindex(IndexKind::Silenced);

        self.finish(mutation, created, &[])?;
        self.metrics.job_reserved();
        debug!(job_id = %payload.id, queue, "Job reserved");
        Ok(())
    }

    pub fn released(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<()> {
        let _guard = self.locks.lock(&payload.id);
        let (mut mutation, created) =
            self.begin(Transition::Release, Some((connection, queue)), payload)?;

        mutation.record.status = JobStatus::Pending;
        mutation.ensure(IndexKind::Pending);
        mutation.unindex(IndexKind::Completed);
        mutation.unindex(IndexKind::Silenced);

        self.finish(mutation, created, &[])?;
        self.metrics.job_released();
        debug!(job_id = %payload.id, queue, "Job released");
        Ok(())
    }

    /// Release every payload back to pending
    ///
    /// Each payload is applied on its own; the first error stops the batch
    /// and earlier payloads stay applied.
    pub fn migrated(&self, connection: &str, queue: &str, payloads: &[JobPayload]) -> Result<()> {
        for payload in payloads {
            self.released(connection, queue, payload)?;
        }
        debug!(connection, queue, count = payloads.len(), "Jobs migrated");
        Ok(())
    }

    /// Mark a job completed and keep it in the monitored index until deleted
    pub fn remember(&self, connection: &str, queue: &str, payload: &JobPayload) -> Result<()> {
        let _guard = self.locks.lock(&payload.id);
        let (mut mutation, created) =
            self.begin(Transition::Remember, Some((connection, queue)), payload)?;

        mutation.record.status = JobStatus::Completed;
        mutation.record.completed_at.get_or_insert_with(|| self.clock.now());
        mutation.unindex(IndexKind::Pending);
        mutation.reindex(IndexKind::Monitored, true);

        self.finish(mutation, created, &[])?;
        self.metrics.job_remembered();
        debug!(job_id = %payload.id, queue, "Job remembered");
        Ok(())
    }

    /// Terminal transition reported after a job ran
    ///
    /// With `failed` set the job goes down the failure path, keeping any
    /// failure detail already stored by [`Engine::failed`].
    pub fn completed(&self, payload: &JobPayload, failed: bool, silenced: bool) -> Result<()> {
        {
            let _guard = self.locks.lock(&payload.id);

            if failed {
                let (mut mutation, created) = self.begin(Transition::Fail, None, payload)?;
                let failure = mutation
                    .record
                    .failure
                    .take()
                    .unwrap_or_else(JobFailure::unreported);
                let totals = self.mark_failed(&mut mutation, failure);
                self.finish(mutation, created, &totals)?;
                self.metrics.job_failed();
            } else {
                let (mut mutation, created) = self.begin(Transition::Complete, None, payload)?;
                let (index, other) = if silenced {
                    (IndexKind::Silenced, IndexKind::Completed)
                } else {
                    (IndexKind::Completed, IndexKind::Silenced)
                };

                mutation.record.status = JobStatus::Completed;
                mutation.record.silenced = silenced;
                mutation.record.completed_at = Some(self.clock.now());
                mutation.record.failure = None;
                mutation.record.failed_at = None;
                mutation.unindex(IndexKind::Pending);
                mutation.unindex(IndexKind::Failed);
                mutation.unindex(IndexKind::RecentFailed);
                mutation.unindex(other);
                mutation.ensure(index);

                self.finish(mutation, created, &[])?;
                self.metrics.job_completed();
            }
            debug!(job_id = %payload.id, failed, silenced, "Job completed");
        }

        if let Some(parent) = &payload.retry_of {
            let status = if failed {
                RetryStatus::Failed
            } else {
                RetryStatus::Completed
            };
            self.update_retry_status(parent, &payload.id, status)?;
        }
        Ok(())
    }

    /// Record a failure reported for a job
    pub fn failed(
        &self,
        failure: JobFailure,
        connection: &str,
        queue: &str,
        payload: &JobPayload,
    ) -> Result<()> {
        {
            let _guard = self.locks.lock(&payload.id);
            let (mut mutation, created) =
                self.begin(Transition::Fail, Some((connection, queue)), payload)?;

            let totals = self.mark_failed(&mut mutation, failure);
            self.finish(mutation, created, &totals)?;
            self.metrics.job_failed();
            debug!(job_id = %payload.id, queue, "Job failed");
        }

        if let Some(parent) = &payload.retry_of {
            self.update_retry_status(parent, &payload.id, RetryStatus::Failed)?;
        }
        Ok(())
    }

    /// Link a retry attempt to the job it retries
    ///
    /// Returns false when `job_id` is unknown. Linking the same retry twice
    /// leaves a single attempt.
    pub fn store_retry_reference(&self, job_id: &str, retry_id: &str) -> Result<bool> {
        let _guard = self.locks.lock(job_id);
        let Some(record) = self.load(job_id)? else {
            debug!(job_id, retry_id, "Retry reference for unknown job ignored");
            return Ok(false);
        };
        if record.retries.iter().any(|attempt| attempt.id == retry_id) {
            return Ok(true);
        }

        let mut mutation = self.mutation(record);
        mutation.record.retries.push(RetryAttempt {
            id: retry_id.to_string(),
            status: RetryStatus::Pending,
            retried_at: self.clock.now(),
        });
        self.finish(mutation, false, &[])?;
        debug!(job_id, retry_id, "Retry reference stored");
        Ok(true)
    }

    /// Failed record for `job_id`, or `None` when absent or not failed
    pub fn find_failed(&self, job_id: &str) -> Result<Option<JobRecord>> {
        Ok(self
            .load(job_id)?
            .filter(|record| record.status == JobStatus::Failed))
    }

    /// Delete a failed job and every index entry pointing at it
    ///
    /// Returns the number of records removed: 1, or 0 when the job is absent
    /// or not failed.
    pub fn delete_failed(&self, job_id: &str) -> Result<usize> {
        let _guard = self.locks.lock(job_id);
        let Some(record) = self.load(job_id)? else {
            return Ok(0);
        };
        if record.status != JobStatus::Failed && !record.is_member_of(IndexKind::Failed) {
            return Ok(0);
        }

        self.delete_record(record)?;
        debug!(job_id, "Failed job deleted");
        Ok(1)
    }

    /// Delete monitored jobs and every index entry pointing at them
    pub fn delete_monitored(&self, job_ids: &[String]) -> Result<usize> {
        let mut removed = 0;
        for job_id in job_ids {
            let _guard = self.locks.lock(job_id);
            let Some(record) = self.load(job_id)? else {
                continue;
            };
            if !record.is_member_of(IndexKind::Monitored) {
                continue;
            }
            self.delete_record(record)?;
            removed += 1;
        }
        debug!(requested = job_ids.len(), removed, "Monitored jobs deleted");
        Ok(removed)
    }

    /// Load (or create) the record and check the transition
    ///
    /// Caller must hold the job's stripe lock.
    fn begin(
        &self,
        transition: Transition,
        route: Route<'_>,
        payload: &JobPayload,
    ) -> Result<(Mutation<'_>, bool)> {
        let existing = self.load(&payload.id)?;

        if let Err(err) = transition.validate(&payload.id, existing.as_ref().map(|r| r.status)) {
            warn!(job_id = %payload.id, error = %err, "Invalid transition applied");
            self.metrics.invalid_transition();
        }

        let created = existing.is_none();
        let mut record = match existing {
            Some(record) => record,
            None => {
                let (connection, queue) = route.unwrap_or_default();
                JobRecord::new(connection, queue, payload, self.clock.now())
            }
        };
        match route {
            Some((connection, queue)) => record.absorb(connection, queue, payload),
            None => {
                let (connection, queue) = (record.connection.clone(), record.queue.clone());
                record.absorb(&connection, &queue, payload);
            }
        }

        Ok((self.mutation(record), created))
    }

    fn mark_failed(&self, mutation: &mut Mutation<'_>, failure: JobFailure) -> Vec<Total> {
        mutation.record.status = JobStatus::Failed;
        mutation.record.silenced = false;
        mutation.record.failure = Some(failure);
        mutation.record.failed_at = Some(self.clock.now());
        mutation.unindex(IndexKind::Pending);
        mutation.unindex(IndexKind::Completed);
        mutation.unindex(IndexKind::Silenced);
        mutation.ensure(IndexKind::RecentFailed);

        if mutation.ensure(IndexKind::Failed) {
            vec![Total::Failed]
        } else {
            Vec::new()
        }
    }

    /// Stamp and commit a transition
    ///
    /// A record left in no index is placed in `recent` so it stays reachable
    /// and eventually trimmable.
    fn finish(&self, mut mutation: Mutation<'_>, created: bool, totals: &[Total]) -> Result<()> {
        if mutation.record.memberships.is_empty() {
            mutation.ensure(IndexKind::Recent);
        }
        mutation.record.updated_at = self.clock.now();

        let mut totals = totals.to_vec();
        if created {
            totals.push(Total::Recent);
        }
        self.commit(mutation, &totals, false)?;
        Ok(())
    }

    fn delete_record(&self, record: JobRecord) -> Result<()> {
        let mut mutation = self.mutation(record);
        mutation.unindex_all();
        self.commit(mutation, &[], true)?;
        Ok(())
    }

    fn update_retry_status(&self, parent_id: &str, retry_id: &str, status: RetryStatus) -> Result<()> {
        let _guard = self.locks.lock(parent_id);
        let Some(mut record) = self.load(parent_id)? else {
            return Ok(());
        };
        let Some(attempt) = record.retries.iter_mut().find(|a| a.id == retry_id) else {
            return Ok(());
        };
        if attempt.status == status {
            return Ok(());
        }
        attempt.status = status;

        self.commit(self.mutation(record), &[], false)?;
        debug!(job_id = parent_id, retry_id, ?status, "Retry status updated");
        Ok(())
    }
}
