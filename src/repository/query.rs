//! Dashboard reads: cursor pages over indexes and batch lookups.

use std::ops::Bound;
use std::sync::Arc;

use tracing::debug;

use super::engine::Engine;
use super::error::Result;
use super::models::{Cursor, IndexKind, IndexedJob, JobRecord, Page};
use crate::config::SearchMode;
use crate::store::partitions::{
    decode_index_key, encode_index_key, encode_index_prefix, encode_index_upper_bound,
};
use crate::store::{Direction, Partition};

/// Extra entries read per page when a search term filters results
const SEARCH_OVERFETCH: usize = 4;

/// Search predicate applied to listings before slicing
pub trait JobMatcher: Send + Sync {
    fn matches(&self, job: &JobRecord, term: &str) -> bool;
}

/// Case-insensitive substring over display name and queue
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl JobMatcher for SubstringMatcher {
    fn matches(&self, job: &JobRecord, term: &str) -> bool {
        let term = term.to_lowercase();
        job.name.to_lowercase().contains(&term) || job.queue.to_lowercase().contains(&term)
    }
}

/// Exact match against payload tags
#[derive(Debug, Clone, Copy, Default)]
pub struct TagMatcher;

impl JobMatcher for TagMatcher {
    fn matches(&self, job: &JobRecord, term: &str) -> bool {
        job.payload.tags.iter().any(|tag| tag == term)
    }
}

pub fn matcher_for(mode: SearchMode) -> Arc<dyn JobMatcher> {
    match mode {
        SearchMode::Substring => Arc::new(SubstringMatcher),
        SearchMode::Tag => Arc::new(TagMatcher),
    }
}

impl Engine {
    pub fn get_recent(&self, after: Option<&Cursor>) -> Result<Page> {
        self.page(IndexKind::Recent, after, None)
    }

    pub fn get_failed(&self, after: Option<&Cursor>) -> Result<Page> {
        self.page(IndexKind::Failed, after, None)
    }

    pub fn get_pending(&self, after: Option<&Cursor>, search: Option<&str>) -> Result<Page> {
        self.page(IndexKind::Pending, after, search)
    }

    pub fn get_completed(&self, after: Option<&Cursor>, search: Option<&str>) -> Result<Page> {
        self.page(IndexKind::Completed, after, search)
    }

    pub fn get_silenced(&self, after: Option<&Cursor>) -> Result<Page> {
        self.page(IndexKind::Silenced, after, None)
    }

    pub fn get_monitored(&self, after: Option<&Cursor>) -> Result<Page> {
        self.page(IndexKind::Monitored, after, None)
    }

    /// Next page of `index`, most recent first, strictly after `after`
    ///
    /// Entries whose record cannot be resolved are dropped on the way. The
    /// search term, when given, filters entries before the page is cut.
    pub fn page(&self, index: IndexKind, after: Option<&Cursor>, search: Option<&str>) -> Result<Page> {
        let search = search.map(str::trim).filter(|term| !term.is_empty());
        let fetch = match search {
            Some(_) => self.page_size * SEARCH_OVERFETCH,
            None => self.page_size,
        };

        let lower = Bound::Included(encode_index_prefix(index.as_str()));
        let mut upper = match after {
            Some(cursor) => Bound::Excluded(encode_index_key(index.as_str(), cursor.rank, &cursor.id)),
            None => Bound::Excluded(encode_index_upper_bound(index.as_str())),
        };
        let mut jobs = Vec::with_capacity(self.page_size);

        loop {
            let chunk = self.store.range(
                Partition::Indexes,
                lower.clone(),
                upper.clone(),
                Direction::Descending,
                fetch,
            )?;
            let Some((last, _)) = chunk.last() else {
                break;
            };
            let next_upper = Bound::Excluded(last.clone());

            for (key, _) in &chunk {
                let Some((_, rank, job_id)) = decode_index_key(key) else {
                    self.drop_key(index, key)?;
                    continue;
                };

                let record = match self.load(&job_id)? {
                    Some(record) if record.memberships.get(&index) == Some(&rank) => record,
                    _ => {
                        self.heal_entry(index, key, rank, &job_id)?;
                        continue;
                    }
                };

                if let Some(term) = search {
                    if !self.matcher.matches(&record, term) {
                        continue;
                    }
                }

                jobs.push(record);
                if jobs.len() == self.page_size {
                    debug!(%index, returned = jobs.len(), "Index page read");
                    return Ok(Page {
                        jobs,
                        next: Some(Cursor::new(rank, job_id)),
                    });
                }
            }

            if chunk.len() < fetch {
                break;
            }
            upper = next_upper;
        }

        debug!(%index, returned = jobs.len(), "Index page read");
        Ok(Page { jobs, next: None })
    }

    /// Look up jobs by ID, preserving request order
    ///
    /// Each hit carries `index_from` plus its position in `ids`; missing IDs
    /// are skipped.
    pub fn get_jobs(&self, ids: &[String], index_from: usize) -> Result<Vec<IndexedJob>> {
        let mut jobs = Vec::with_capacity(ids.len());
        for (offset, id) in ids.iter().enumerate() {
            if let Some(job) = self.load(id)? {
                jobs.push(IndexedJob {
                    index: index_from + offset,
                    job,
                });
            }
        }
        Ok(jobs)
    }
}
