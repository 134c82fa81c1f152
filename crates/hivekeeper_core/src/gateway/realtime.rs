//! Table change notifications.

use super::row::Row;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    /// New row for inserts/updates, removed row for deletes.
    pub row: Row,
}

/// Live change feed for one table. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    table: String,
    receiver: Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(table: impl Into<String>, receiver: Receiver<ChangeEvent>) -> Self {
        Self {
            table: table.into(),
            receiver,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn try_next(&self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Blocks up to `timeout`; `None` on timeout or when the source is gone.
    pub fn next_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Returns every event already delivered, oldest first.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.receiver.try_iter().collect()
    }
}

/// In-process fan-out to table subscribers.
#[derive(Debug, Default)]
pub(crate) struct Broadcaster {
    subscribers: RefCell<Vec<(String, Sender<ChangeEvent>)>>,
}

impl Broadcaster {
    pub(crate) fn subscribe(&self, table: &str) -> Subscription {
        let (sender, receiver) = channel();
        self.subscribers
            .borrow_mut()
            .push((table.to_string(), sender));
        Subscription::new(table, receiver)
    }

    /// Delivers `event` to subscribers of its table and prunes dropped ones.
    pub(crate) fn publish(&self, event: &ChangeEvent) {
        self.subscribers.borrow_mut().retain(|(table, sender)| {
            if *table != event.table {
                return true;
            }
            sender.send(event.clone()).is_ok()
        });
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}
