//! Request validation for dashboard endpoints

use thiserror::Error;

use super::error::ApiError;
use crate::repository::{Cursor, IndexKind};

pub const MAX_BATCH_IDS: usize = 1000;
pub const MAX_SEARCH_LEN: usize = 256;
pub const MAX_TAG_LEN: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("unknown view '{0}'; expected recent, pending, completed, silenced, failed or monitored")]
    UnknownView(String),
    #[error("invalid cursor '{0}'")]
    InvalidCursor(String),
    #[error("search term longer than {MAX_SEARCH_LEN} characters")]
    SearchTooLong,
    #[error("batch of {0} ids exceeds limit of {MAX_BATCH_IDS}")]
    TooManyIds(usize),
    #[error("tag must be 1 to {MAX_TAG_LEN} characters")]
    InvalidTag,
}

impl From<RequestValidationError> for ApiError {
    fn from(value: RequestValidationError) -> Self {
        ApiError::InvalidRequest(value.to_string())
    }
}

/// Map a listing path segment to its index
///
/// `recent_failed` is served through `failed`; it is not a view of its own.
pub fn parse_view(view: &str) -> Result<IndexKind, RequestValidationError> {
    match view {
        "recent" => Ok(IndexKind::Recent),
        "pending" => Ok(IndexKind::Pending),
        "completed" => Ok(IndexKind::Completed),
        "silenced" => Ok(IndexKind::Silenced),
        "failed" => Ok(IndexKind::Failed),
        "monitored" => Ok(IndexKind::Monitored),
        other => Err(RequestValidationError::UnknownView(other.to_string())),
    }
}

pub fn parse_cursor(after: Option<&str>) -> Result<Option<Cursor>, RequestValidationError> {
    match after.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| RequestValidationError::InvalidCursor(raw.to_string())),
        None => Ok(None),
    }
}

pub fn validate_search(search: Option<&str>) -> Result<(), RequestValidationError> {
    match search {
        Some(term) if term.chars().count() > MAX_SEARCH_LEN => Err(RequestValidationError::SearchTooLong),
        _ => Ok(()),
    }
}

pub fn validate_ids(ids: &[String]) -> Result<(), RequestValidationError> {
    if ids.len() > MAX_BATCH_IDS {
        return Err(RequestValidationError::TooManyIds(ids.len()));
    }
    Ok(())
}

pub fn validate_tag(tag: &str) -> Result<(), RequestValidationError> {
    let len = tag.trim().chars().count();
    if len == 0 || len > MAX_TAG_LEN {
        return Err(RequestValidationError::InvalidTag);
    }
    Ok(())
}
