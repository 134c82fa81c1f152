//! Dashboard aggregation over already fetched rows.

use crate::model::action::{Action, ActionDetailRecord, ActionId, ActionKind};
use crate::model::hive::{Hive, HiveStatus};
use crate::model::transaction::{Transaction, TransactionKind};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

pub const RECENT_WINDOW_MS: i64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Default)]
pub struct StatsInput {
    pub hives: Vec<Hive>,
    pub actions: Vec<Action>,
    /// Harvest detail rows; rows whose action is not in `actions` are ignored.
    pub harvests: Vec<ActionDetailRecord>,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DashboardStats {
    pub total_hives: u32,
    pub active_hives: u32,
    pub hives_by_status: BTreeMap<HiveStatus, u32>,
    /// Active hives per species id.
    pub active_hives_by_species: BTreeMap<String, u32>,
    pub actions_by_kind: BTreeMap<ActionKind, u32>,
    pub actions_last_30_days: u32,
    pub honey_harvested_ml: f64,
    pub transactions_by_kind: BTreeMap<TransactionKind, u32>,
    pub sales_revenue: f64,
    /// Most recent action or transaction time.
    pub last_activity_at: Option<i64>,
}

pub fn aggregate(input: &StatsInput, now_ms: i64) -> DashboardStats {
    let mut stats = DashboardStats::default();

    for hive in &input.hives {
        stats.total_hives += 1;
        *stats.hives_by_status.entry(hive.status).or_insert(0) += 1;
        if hive.is_active() {
            stats.active_hives += 1;
            *stats
                .active_hives_by_species
                .entry(hive.species.clone())
                .or_insert(0) += 1;
        }
    }

    let window_start = now_ms.saturating_sub(RECENT_WINDOW_MS);
    let mut harvest_actions: HashSet<ActionId> = HashSet::new();
    for action in &input.actions {
        *stats.actions_by_kind.entry(action.kind).or_insert(0) += 1;
        if action.performed_at >= window_start && action.performed_at <= now_ms {
            stats.actions_last_30_days += 1;
        }
        if action.kind == ActionKind::Harvest {
            harvest_actions.insert(action.id);
        }
        note_activity(&mut stats, action.performed_at);
    }

    stats.honey_harvested_ml = input
        .harvests
        .iter()
        .filter(|record| harvest_actions.contains(&record.action_id))
        .filter_map(|record| record.detail.honey_ml())
        .sum();

    for transaction in &input.transactions {
        *stats
            .transactions_by_kind
            .entry(transaction.kind)
            .or_insert(0) += 1;
        if transaction.kind == TransactionKind::Sale {
            stats.sales_revenue += transaction.amount.unwrap_or(0.0);
        }
        note_activity(&mut stats, transaction.occurred_at);
    }

    stats
}

fn note_activity(stats: &mut DashboardStats, at: i64) {
    stats.last_activity_at = Some(stats.last_activity_at.map_or(at, |last| last.max(at)));
}
