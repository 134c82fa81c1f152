//! Domain model for hives and their management history.
//!
//! # Responsibility
//! - Define the records exchanged with the hosted store.
//! - Keep validation rules next to the data they guard.
//!
//! # Invariants
//! - Every record is identified by a client-generated UUID, so records created
//!   offline keep a stable identity once replayed.
//! - All instants are Unix epoch milliseconds.

pub mod action;
pub mod catalog;
pub mod hive;
pub mod profile;
pub mod transaction;
pub(crate) mod validation;

pub use validation::ValidationError;

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identifier of an authenticated backend user.
pub type UserId = Uuid;

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Trims optional free text and maps blank input to `None`.
pub(crate) fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value.and_then(|text| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
