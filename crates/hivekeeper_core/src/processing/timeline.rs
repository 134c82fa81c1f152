//! Hive timeline: actions and transactions merged into one feed.
//!
//! # Invariants
//! - Entries are ordered by `occurred_at DESC, created_at DESC, id ASC`.
//! - An action carries its detail only when the detail kind matches the
//!   action kind; the first matching detail row wins.

use crate::model::action::{Action, ActionDetail, ActionDetailRecord, ActionId};
use crate::model::transaction::Transaction;
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineItem {
    Action {
        action: Action,
        detail: Option<ActionDetail>,
    },
    Transaction(Transaction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub id: Uuid,
    pub occurred_at: i64,
    pub created_at: i64,
    pub item: TimelineItem,
}

impl TimelineEntry {
    /// Wire name of the action or transaction kind.
    pub fn kind_label(&self) -> &'static str {
        match &self.item {
            TimelineItem::Action { action, .. } => action.kind.as_str(),
            TimelineItem::Transaction(transaction) => transaction.kind.as_str(),
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self.item, TimelineItem::Transaction(_))
    }

    pub fn summary(&self) -> Option<String> {
        match &self.item {
            TimelineItem::Action { detail, .. } => detail.as_ref().map(ActionDetail::summary),
            TimelineItem::Transaction(transaction) => Some(transaction.summary()),
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match &self.item {
            TimelineItem::Action { action, .. } => action.notes.as_deref(),
            TimelineItem::Transaction(transaction) => transaction.notes.as_deref(),
        }
    }
}

/// Entries sharing one calendar day in the viewer's time zone.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineDay {
    /// Start of the local day, as epoch milliseconds.
    pub day_start_ms: i64,
    pub entries: Vec<TimelineEntry>,
}

pub fn merge_timeline(
    actions: Vec<Action>,
    details: Vec<ActionDetailRecord>,
    transactions: Vec<Transaction>,
) -> Vec<TimelineEntry> {
    let mut details_by_action: HashMap<ActionId, ActionDetail> = HashMap::new();
    for record in details {
        details_by_action
            .entry(record.action_id)
            .or_insert(record.detail);
    }

    let mut entries = Vec::with_capacity(actions.len() + transactions.len());
    for action in actions {
        let detail = details_by_action
            .remove(&action.id)
            .filter(|detail| detail.kind() == action.kind);
        entries.push(TimelineEntry {
            id: action.id,
            occurred_at: action.performed_at,
            created_at: action.created_at,
            item: TimelineItem::Action { action, detail },
        });
    }
    for transaction in transactions {
        entries.push(TimelineEntry {
            id: transaction.id,
            occurred_at: transaction.occurred_at,
            created_at: transaction.created_at,
            item: TimelineItem::Transaction(transaction),
        });
    }

    entries.sort_by(compare_entries);
    entries
}

fn compare_entries(left: &TimelineEntry, right: &TimelineEntry) -> Ordering {
    right
        .occurred_at
        .cmp(&left.occurred_at)
        .then_with(|| right.created_at.cmp(&left.created_at))
        .then_with(|| left.id.cmp(&right.id))
}

/// Groups an already merged timeline by local calendar day, newest first.
pub fn group_by_day(entries: Vec<TimelineEntry>, utc_offset_minutes: i32) -> Vec<TimelineDay> {
    let offset_ms = i64::from(utc_offset_minutes) * 60 * 1000;
    let mut days: Vec<TimelineDay> = Vec::new();
    for entry in entries {
        let local = entry.occurred_at + offset_ms;
        let day_start_ms = local.div_euclid(DAY_MS) * DAY_MS - offset_ms;
        match days.last_mut() {
            Some(day) if day.day_start_ms == day_start_ms => day.entries.push(entry),
            _ => days.push(TimelineDay {
                day_start_ms,
                entries: vec![entry],
            }),
        }
    }
    days
}
