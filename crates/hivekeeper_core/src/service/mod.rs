//! Core use-case services.
//!
//! # Responsibility
//! - Translate UI intents into one or more gateway calls.
//! - Route writes through the offline queue when the backend is unreachable.
//! - Normalize failures into `ServiceError` with a stable user message.
//!
//! # Invariants
//! - User-owned data is always filtered by the session's user id.
//! - While the queue holds items, new writes are queued behind them unless a
//!   flush drains it first, so replay order matches call order.
//! - Reads that decide whether a write is allowed run after a flush attempt
//!   and see queued values that are still pending.

pub mod action_service;
pub mod general_data_service;
pub mod hive_service;
pub mod profile_service;
pub mod stats_service;
pub mod storage_service;

use crate::gateway::{from_rows, GatewayError, Query, RemoteGateway};
use crate::model::{now_epoch_ms, UserId, ValidationError};
use crate::queue::{dispatch, Dispatched, OfflineQueue, PendingMutation, QueueError};
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    Validation(ValidationError),
    /// No session, or the session has expired.
    Unauthenticated,
    NotFound {
        entity: &'static str,
        id: String,
    },
    /// Request conflicts with the record's current state.
    InvalidState(String),
    Gateway(GatewayError),
    Queue(QueueError),
}

impl ServiceError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Gateway(err) if err.is_network())
    }

    /// Short, stable message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => format!("Please check the form: {err}."),
            Self::Unauthenticated | Self::Gateway(GatewayError::Unauthorized(_)) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            Self::NotFound { entity, .. } => format!("This {entity} no longer exists."),
            Self::Gateway(GatewayError::NotFound(_)) => {
                "This record no longer exists.".to_string()
            }
            Self::InvalidState(message) => message.clone(),
            Self::Gateway(GatewayError::Network(_)) => {
                "You're offline. Check your connection and try again.".to_string()
            }
            Self::Gateway(GatewayError::Conflict(_)) => "This record already exists.".to_string(),
            Self::Gateway(_) | Self::Queue(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Unauthenticated => write!(f, "no authenticated session"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidState(message) => write!(f, "{message}"),
            Self::Gateway(err) => write!(f, "{err}"),
            Self::Queue(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Gateway(err) => Some(err),
            Self::Queue(err) => Some(err),
            Self::Unauthenticated | Self::NotFound { .. } | Self::InvalidState(_) => None,
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<GatewayError> for ServiceError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

impl From<QueueError> for ServiceError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::Gateway(err) => Self::Gateway(err),
            other => Self::Queue(other),
        }
    }
}

/// A write result and whether part of it still waits in the offline queue.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome<T> {
    pub record: T,
    pub pending_sync: bool,
}

/// Gateway plus optional offline queue shared by all services.
pub struct ServiceContext<'a, G: RemoteGateway + ?Sized> {
    gateway: &'a G,
    queue: Option<&'a OfflineQueue<'a>>,
}

impl<G: RemoteGateway + ?Sized> Clone for ServiceContext<'_, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: RemoteGateway + ?Sized> Copy for ServiceContext<'_, G> {}

impl<'a, G: RemoteGateway + ?Sized> ServiceContext<'a, G> {
    /// Online-only context: writes fail when the backend is unreachable.
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            queue: None,
        }
    }

    pub fn with_queue(gateway: &'a G, queue: &'a OfflineQueue<'a>) -> Self {
        Self {
            gateway,
            queue: Some(queue),
        }
    }

    pub fn gateway(&self) -> &'a G {
        self.gateway
    }

    /// Id of the signed-in user; errors when there is no live session.
    pub fn user_id(&self) -> ServiceResult<UserId> {
        match self.gateway.session() {
            Some(session) if !session.is_expired(now_epoch_ms()) => Ok(session.user_id),
            _ => Err(ServiceError::Unauthenticated),
        }
    }

    pub(crate) fn select<T: DeserializeOwned>(&self, query: &Query) -> ServiceResult<Vec<T>> {
        let rows = self.gateway.select(query)?;
        Ok(from_rows(rows)?)
    }

    /// Whether a failed read may be tolerated because writes can be queued.
    pub(crate) fn tolerates_offline(&self, err: &ServiceError) -> bool {
        self.queue.is_some() && err.is_offline()
    }

    /// Replays queued writes so the next read sees them remotely.
    ///
    /// An unreachable backend is not an error here; the items stay queued.
    pub(crate) fn sync_pending(&self) -> ServiceResult<()> {
        let Some(queue) = self.queue else {
            return Ok(());
        };
        if queue.is_empty()? {
            return Ok(());
        }
        let report = queue.flush(self.gateway)?;
        debug!(
            "event=queue_presync module=service status=ok sent={} remaining={} stopped_offline={}",
            report.sent, report.remaining, report.stopped_offline
        );
        Ok(())
    }

    /// Latest value still queued for `column` of row `id` in `table`.
    pub(crate) fn queued_value(
        &self,
        table: &str,
        id: &str,
        column: &str,
    ) -> ServiceResult<Option<Value>> {
        let Some(queue) = self.queue else {
            return Ok(None);
        };
        Ok(queue
            .list()?
            .iter()
            .filter_map(|item| item.mutation.written_value(table, id, column))
            .last()
            .cloned())
    }

    pub(crate) fn dispatch(&self, mutation: PendingMutation) -> ServiceResult<Dispatched> {
        if let Some(queue) = self.queue {
            if !queue.is_empty()? {
                let report = queue.flush(self.gateway)?;
                if report.stopped_offline {
                    return Ok(Dispatched::Queued(queue.enqueue(&mutation)?));
                }
            }
        }
        Ok(dispatch(self.gateway, self.queue, mutation)?)
    }
}
