//! Remote data gateway.
//!
//! # Responsibility
//! - Expose the hosted store as a generic row-level CRUD + subscribe API.
//! - Classify failures so callers can tell "offline" from "rejected".
//!
//! # Invariants
//! - Rows are JSON objects keyed by column name.
//! - `delete` and `update` always carry at least one filter.
//! - Only `GatewayError::Network` means the request may succeed later
//!   unchanged.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod embedded;
mod query;
mod realtime;
mod rest;
mod row;
pub mod tables;

pub use embedded::EmbeddedGateway;
pub use query::{Direction, Filter, OrderBy, Query};
pub use realtime::{ChangeEvent, ChangeKind, Subscription};
pub use rest::RestGateway;
pub use row::{from_row, from_rows, to_row, Row};

use crate::model::UserId;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Authenticated backend session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub access_token: String,
    pub expires_at_ms: Option<i64>,
}

impl Session {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|expires_at| expires_at <= now_ms)
    }
}

#[derive(Debug)]
pub enum GatewayError {
    /// Backend unreachable; the same request may succeed later.
    Network(String),
    /// Missing, expired or rejected credentials.
    Unauthorized(String),
    NotFound(String),
    /// Unique key or constraint violation.
    Conflict(String),
    /// Request rejected before being sent.
    InvalidRequest(String),
    Remote {
        status: u16,
        message: String,
    },
    /// Response body could not be decoded into the expected shape.
    InvalidResponse(String),
    Unsupported(&'static str),
    Local(DbError),
}

impl GatewayError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(message) => write!(f, "backend unreachable: {message}"),
            Self::Unauthorized(message) => write!(f, "unauthorized: {message}"),
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::InvalidRequest(message) => write!(f, "invalid request: {message}"),
            Self::Remote { status, message } => {
                write!(f, "backend returned status {status}: {message}")
            }
            Self::InvalidResponse(message) => write!(f, "invalid backend response: {message}"),
            Self::Unsupported(operation) => write!(f, "unsupported operation: {operation}"),
            Self::Local(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Local(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for GatewayError {
    fn from(value: DbError) -> Self {
        Self::Local(value)
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Local(DbError::Sqlite(value))
    }
}

/// Generic access to the hosted relational store, file storage and realtime
/// change feed.
pub trait RemoteGateway {
    /// Current authenticated session, if any.
    fn session(&self) -> Option<Session>;

    fn select(&self, query: &Query) -> GatewayResult<Vec<Row>>;

    /// Inserts one row and returns it as stored.
    fn insert(&self, table: &str, row: Row) -> GatewayResult<Row>;

    /// Merges `patch` into every row matching `filters`; returns changed rows.
    fn update(&self, table: &str, filters: &[Filter], patch: Row) -> GatewayResult<Vec<Row>>;

    /// Deletes every row matching `filters`; returns the removed row count.
    fn delete(&self, table: &str, filters: &[Filter]) -> GatewayResult<u64>;

    /// Stores an object, replacing any previous one; returns its public URL.
    fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> GatewayResult<String>;

    fn remove_object(&self, bucket: &str, path: &str) -> GatewayResult<()>;

    /// Removes every object stored under `folder/`; returns how many went.
    fn remove_folder(&self, bucket: &str, folder: &str) -> GatewayResult<u64>;

    /// Public URL an object at `path` is (or would be) served from.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    fn subscribe(&self, table: &str) -> GatewayResult<Subscription>;
}

/// `folder` with exactly one trailing slash; a blank folder would match the
/// whole bucket and is rejected.
pub(crate) fn folder_prefix(folder: &str) -> GatewayResult<String> {
    let trimmed = folder.trim_matches('/');
    if trimmed.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "folder removal requires a non-empty folder".to_string(),
        ));
    }
    Ok(format!("{trimmed}/"))
}

pub(crate) fn require_filters(operation: &str, filters: &[Filter]) -> GatewayResult<()> {
    if filters.is_empty() {
        return Err(GatewayError::InvalidRequest(format!(
            "{operation} requires at least one filter"
        )));
    }
    Ok(())
}
