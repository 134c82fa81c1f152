//! Offline mutation queue.
//!
//! # Responsibility
//! - Persist writes that could not reach the backend.
//! - Replay them in FIFO order once connectivity returns.
//!
//! # Invariants
//! - Replay order is enqueue order (`pending_mutations.id ASC`).
//! - A replayed item leaves the queue only after the backend accepted it.
//! - A network failure ends the flush; later items are not attempted.
//! - Any other failure keeps the item (attempts + last error) and the flush
//!   moves on. Items whose payload no longer decodes are treated the same
//!   way and never block the rest of the queue.

mod mutation;
mod reconnect;

pub use mutation::{MutationOutcome, PendingMutation};
pub use reconnect::ReconnectFlusher;

use crate::db::DbError;
use crate::gateway::{GatewayError, RemoteGateway};
use log::{info, warn};
use rusqlite::{params, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const MAX_LAST_ERROR_CHARS: usize = 300;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug)]
pub enum QueueError {
    Db(DbError),
    /// Stored payload does not decode into a mutation.
    InvalidPayload { id: i64, message: String },
    /// Remote failure that was not eligible for queueing.
    Gateway(GatewayError),
}

impl Display for QueueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidPayload { id, message } => {
                write!(f, "invalid queued mutation {id}: {message}")
            }
            Self::Gateway(err) => write!(f, "{err}"),
        }
    }
}

impl Error for QueueError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidPayload { .. } => None,
            Self::Gateway(err) => Some(err),
        }
    }
}

impl From<DbError> for QueueError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for QueueError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// A queued mutation with its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMutation {
    pub id: i64,
    pub mutation: PendingMutation,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub queued_at: i64,
}

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub sent: u32,
    pub failed: u32,
    pub remaining: u32,
    /// Flush ended early because the backend became unreachable.
    pub stopped_offline: bool,
}

/// Where a dispatched mutation ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Applied(MutationOutcome),
    /// Stored locally under this queue id.
    Queued(i64),
}

impl Dispatched {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// Queue persisted in the local `pending_mutations` table.
pub struct OfflineQueue<'conn> {
    conn: &'conn Connection,
}

impl<'conn> OfflineQueue<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn enqueue(&self, mutation: &PendingMutation) -> QueueResult<i64> {
        let payload = serde_json::to_string(mutation).map_err(|err| QueueError::InvalidPayload {
            id: 0,
            message: err.to_string(),
        })?;
        self.conn.execute(
            "INSERT INTO pending_mutations (operation, table_name, payload) VALUES (?1, ?2, ?3);",
            params![mutation.operation(), mutation.table(), payload],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(
            "event=queue_enqueue module=queue status=ok id={} operation={} table={}",
            id,
            mutation.operation(),
            mutation.table()
        );
        Ok(id)
    }

    /// All decodable queued mutations, oldest first.
    ///
    /// Items with an undecodable payload are skipped; `len` still counts them.
    pub fn list(&self) -> QueueResult<Vec<QueuedMutation>> {
        let (queued, undecodable) = self.load()?;
        for (id, message) in &undecodable {
            warn!("event=queue_decode module=queue status=error id={id} error={message}");
        }
        Ok(queued)
    }

    fn load(&self) -> QueueResult<(Vec<QueuedMutation>, Vec<(i64, String)>)> {
        let mut stmt = self.conn.prepare(
            "SELECT id, payload, attempts, last_error, queued_at
             FROM pending_mutations
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut queued = Vec::new();
        let mut undecodable = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let payload: String = row.get(1)?;
            match serde_json::from_str(&payload) {
                Ok(mutation) => queued.push(QueuedMutation {
                    id,
                    mutation,
                    attempts: row.get(2)?,
                    last_error: row.get(3)?,
                    queued_at: row.get(4)?,
                }),
                Err(err) => undecodable.push((id, err.to_string())),
            }
        }
        Ok((queued, undecodable))
    }

    pub fn len(&self) -> QueueResult<u32> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM pending_mutations;", [], |row| {
                row.get::<_, u32>(0)
            })?;
        Ok(count)
    }

    pub fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes one item; returns whether it existed.
    pub fn remove(&self, id: i64) -> QueueResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM pending_mutations WHERE id = ?1;", [id])?;
        Ok(removed > 0)
    }

    /// Drops every queued item; returns how many were dropped.
    pub fn clear(&self) -> QueueResult<u32> {
        let removed = self.conn.execute("DELETE FROM pending_mutations;", [])?;
        warn!("event=queue_clear module=queue status=ok dropped={removed}");
        Ok(u32::try_from(removed).unwrap_or(u32::MAX))
    }

    /// Replays queued mutations against `gateway`, oldest first.
    pub fn flush<G: RemoteGateway + ?Sized>(&self, gateway: &G) -> QueueResult<FlushReport> {
        let started_at = Instant::now();
        let mut report = FlushReport::default();
        let (queued, undecodable) = self.load()?;

        for (id, message) in undecodable {
            let error = QueueError::InvalidPayload { id, message };
            self.record_failure(id, &error.to_string())?;
            report.failed += 1;
            warn!("event=queue_replay module=queue status=error id={id} error_code=undecodable error={error}");
        }

        for item in queued {
            match item.mutation.apply(gateway) {
                Ok(_) => {
                    self.remove(item.id)?;
                    report.sent += 1;
                }
                Err(err) if err.is_network() => {
                    report.stopped_offline = true;
                    break;
                }
                Err(err) => {
                    self.record_failure(item.id, &err.to_string())?;
                    report.failed += 1;
                    warn!(
                        "event=queue_replay module=queue status=error id={} operation={} table={} attempts={} error={}",
                        item.id,
                        item.mutation.operation(),
                        item.mutation.table(),
                        item.attempts + 1,
                        err
                    );
                }
            }
        }

        report.remaining = self.len()?;
        info!(
            "event=queue_flush module=queue status=ok sent={} failed={} remaining={} stopped_offline={} duration_ms={}",
            report.sent,
            report.failed,
            report.remaining,
            report.stopped_offline,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn record_failure(&self, id: i64, error: &str) -> QueueResult<()> {
        let message = error.chars().take(MAX_LAST_ERROR_CHARS).collect::<String>();
        self.conn.execute(
            "UPDATE pending_mutations
             SET attempts = attempts + 1, last_error = ?1
             WHERE id = ?2;",
            params![message, id],
        )?;
        Ok(())
    }
}

/// Applies `mutation` remotely, falling back to `queue` when the backend is
/// unreachable.
///
/// Without a queue, or for non-network failures, the gateway error is
/// returned unchanged.
pub fn dispatch<G: RemoteGateway + ?Sized>(
    gateway: &G,
    queue: Option<&OfflineQueue<'_>>,
    mutation: PendingMutation,
) -> QueueResult<Dispatched> {
    match mutation.apply(gateway) {
        Ok(outcome) => Ok(Dispatched::Applied(outcome)),
        Err(err) if err.is_network() => match queue {
            Some(queue) => Ok(Dispatched::Queued(queue.enqueue(&mutation)?)),
            None => Err(QueueError::Gateway(err)),
        },
        Err(err) => Err(QueueError::Gateway(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::{dispatch, Dispatched, OfflineQueue, PendingMutation, QueueError};
    use crate::db::open_db_in_memory;
    use crate::gateway::{EmbeddedGateway, Filter, Query, RemoteGateway, Row};
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn enqueue_and_list_preserve_fifo_order() {
        let conn = open_db_in_memory().unwrap();
        let queue = OfflineQueue::new(&conn);

        let first = queue
            .enqueue(&PendingMutation::insert("hives", row(json!({"id": "h1"}))))
            .unwrap();
        let second = queue
            .enqueue(&PendingMutation::delete(
                "hives",
                vec![Filter::eq("id", "h1")],
            ))
            .unwrap();

        let listed = queue.list().unwrap();
        assert_eq!(
            listed.iter().map(|item| item.id).collect::<Vec<_>>(),
            vec![first, second]
        );
        assert_eq!(listed[1].mutation.operation(), "delete");
        assert_eq!(listed[0].attempts, 0);
        assert_eq!(queue.len().unwrap(), 2);
    }

    #[test]
    fn dispatch_queues_only_network_failures() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        let queue = OfflineQueue::new(&conn);

        gateway.set_online(false);
        let queued = dispatch(
            &gateway,
            Some(&queue),
            PendingMutation::insert("hives", row(json!({"id": "h1"}))),
        )
        .unwrap();
        assert!(queued.is_queued());

        let no_queue = dispatch(
            &gateway,
            None,
            PendingMutation::insert("hives", row(json!({"id": "h2"}))),
        );
        assert!(matches!(no_queue, Err(QueueError::Gateway(err)) if err.is_network()));

        gateway.set_online(true);
        let rejected = dispatch(
            &gateway,
            Some(&queue),
            PendingMutation::delete("hives", Vec::new()),
        );
        assert!(matches!(rejected, Err(QueueError::Gateway(_))));
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn flush_replays_in_order_and_keeps_rejected_items() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        let queue = OfflineQueue::new(&conn);
        gateway
            .insert("hives", row(json!({"id": "dup"})))
            .unwrap();

        queue
            .enqueue(&PendingMutation::insert("hives", row(json!({"id": "h1", "status": "active"}))))
            .unwrap();
        let rejected_id = queue
            .enqueue(&PendingMutation::insert("hives", row(json!({"id": "dup"}))))
            .unwrap();
        queue
            .enqueue(&PendingMutation::update(
                "hives",
                vec![Filter::eq("id", "h1")],
                row(json!({"status": "sold"})),
            ))
            .unwrap();

        let report = queue.flush(&gateway).unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);
        assert!(!report.stopped_offline);

        let hive = gateway
            .select(&Query::table("hives").filter(Filter::eq("id", "h1")))
            .unwrap();
        assert_eq!(hive[0]["status"], "sold");

        let left = queue.list().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, rejected_id);
        assert_eq!(left[0].attempts, 1);
        assert!(left[0].last_error.as_deref().unwrap().contains("conflict"));
    }

    #[test]
    fn flush_stops_at_network_failure_without_counting_attempts() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        let queue = OfflineQueue::new(&conn);
        queue
            .enqueue(&PendingMutation::insert("hives", row(json!({"id": "h1"}))))
            .unwrap();
        queue
            .enqueue(&PendingMutation::insert("hives", row(json!({"id": "h2"}))))
            .unwrap();

        gateway.set_online(false);
        let report = queue.flush(&gateway).unwrap();
        assert!(report.stopped_offline);
        assert_eq!(report.sent, 0);
        assert_eq!(report.remaining, 2);
        assert!(queue.list().unwrap().iter().all(|item| item.attempts == 0));

        gateway.set_online(true);
        let report = queue.flush(&gateway).unwrap();
        assert_eq!(report.sent, 2);
        assert!(queue.is_empty().unwrap());
        assert!(matches!(
            dispatch(&gateway, Some(&queue), PendingMutation::insert("hives", row(json!({"id": "h3"})))),
            Ok(Dispatched::Applied(_))
        ));
    }

    #[test]
    fn undecodable_payload_is_skipped_and_marked_failed() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        let queue = OfflineQueue::new(&conn);
        conn.execute(
            "INSERT INTO pending_mutations (operation, table_name, payload) VALUES ('insert', 'hives', '{not json');",
            [],
        )
        .unwrap();
        let broken_id = conn.last_insert_rowid();
        queue
            .enqueue(&PendingMutation::insert("hives", row(json!({"id": "h1"}))))
            .unwrap();

        let listed = queue.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(queue.len().unwrap(), 2);

        let report = queue.flush(&gateway).unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(gateway.select(&Query::table("hives")).unwrap().len(), 1);

        let (attempts, last_error): (u32, String) = conn
            .query_row(
                "SELECT attempts, last_error FROM pending_mutations WHERE id = ?1;",
                [broken_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(attempts, 1);
        assert!(last_error.contains("invalid queued mutation"));

        let later = dispatch(
            &gateway,
            Some(&queue),
            PendingMutation::insert("hives", row(json!({"id": "h2"}))),
        )
        .unwrap();
        assert!(!later.is_queued());
    }

    #[test]
    fn remove_and_clear_report_what_they_dropped() {
        let conn = open_db_in_memory().unwrap();
        let queue = OfflineQueue::new(&conn);
        let id = queue
            .enqueue(&PendingMutation::delete("actions", vec![Filter::eq("id", "a")]))
            .unwrap();
        queue
            .enqueue(&PendingMutation::delete("actions", vec![Filter::eq("id", "b")]))
            .unwrap();

        assert!(queue.remove(id).unwrap());
        assert!(!queue.remove(id).unwrap());
        assert_eq!(queue.clear().unwrap(), 1);
        assert!(queue.is_empty().unwrap());
    }
}
