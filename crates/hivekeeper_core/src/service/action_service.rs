//! Action and transaction use-case service.
//!
//! # Responsibility
//! - Record management actions (common row + per-kind detail row).
//! - Record disposal transactions and keep the hive status in step.
//! - Build the merged hive timeline.
//!
//! # Invariants
//! - New actions and transactions are only accepted for active hives.
//! - The action row is written before its detail; deletes go detail first.
//! - After a transaction delete, the hive status follows its latest remaining
//!   transaction, or returns to `active` when none remain.

use super::hive_service::HiveService;
use super::{ServiceContext, ServiceError, ServiceResult, WriteOutcome};
use crate::gateway::{tables, to_row, Direction, Filter, Query, RemoteGateway};
use crate::model::action::{
    Action, ActionDetail, ActionDetailRecord, ActionId, ActionKind, ActionRecord, NewAction,
};
use crate::model::hive::{Hive, HiveId, HiveOrigin, HiveStatus, NewHive};
use crate::model::transaction::{NewTransaction, Transaction};
use crate::model::{now_epoch_ms, UserId};
use crate::processing::timeline::{merge_timeline, TimelineEntry};
use crate::queue::PendingMutation;
use log::info;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

pub struct ActionService<'a, G: RemoteGateway + ?Sized> {
    ctx: ServiceContext<'a, G>,
}

impl<'a, G: RemoteGateway + ?Sized> ActionService<'a, G> {
    pub fn new(ctx: ServiceContext<'a, G>) -> Self {
        Self { ctx }
    }

    fn hives(&self) -> HiveService<'a, G> {
        HiveService::new(self.ctx)
    }

    /// Records an action and its detail.
    ///
    /// A division also creates the new hive, copying species, box type and
    /// location from the parent. Divisions need the parent hive, so they are
    /// not accepted while offline.
    pub fn record_action(
        &self,
        mut input: NewAction,
    ) -> ServiceResult<WriteOutcome<ActionRecord>> {
        let user_id = self.ctx.user_id()?;
        input.detail.validate()?;

        let is_division = input.detail.kind() == ActionKind::Division;
        let parent = self.require_active_hive(input.hive_id, !is_division)?;
        let mut pending_sync = false;

        if let ActionDetail::Division {
            new_hive_id,
            new_hive_name,
        } = &mut input.detail
        {
            let Some(parent) = parent else {
                return Err(ServiceError::InvalidState(
                    "A division needs the parent hive; try again when online.".to_string(),
                ));
            };
            let created = self.hives().create_hive(NewHive {
                name: new_hive_name.clone(),
                species: parent.species.clone(),
                origin: Some(HiveOrigin::Division),
                box_type: parent.box_type.clone(),
                location: parent.location(),
                notes: None,
                acquired_at: input.performed_at,
            })?;
            pending_sync |= created.pending_sync;
            *new_hive_id = Some(created.record.id);
        }

        let action = Action::from_new(user_id, &input, now_epoch_ms());
        let detail = ActionDetailRecord::new(action.id, action.hive_id, input.detail);
        pending_sync |= self
            .ctx
            .dispatch(PendingMutation::insert(tables::ACTIONS, to_row(&action)?))?
            .is_queued();
        pending_sync |= self
            .ctx
            .dispatch(PendingMutation::insert(
                action.kind.detail_table(),
                to_row(&detail)?,
            ))?
            .is_queued();

        info!(
            "event=action_record module=service status=ok action_id={} hive_id={} kind={} pending_sync={}",
            action.id,
            action.hive_id,
            action.kind.as_str(),
            pending_sync
        );
        Ok(WriteOutcome {
            record: ActionRecord {
                action,
                detail: Some(detail.detail),
            },
            pending_sync,
        })
    }

    /// Actions of a hive, newest first, with their details.
    pub fn list_actions(
        &self,
        hive_id: HiveId,
        kind: Option<ActionKind>,
    ) -> ServiceResult<Vec<ActionRecord>> {
        let user_id = self.ctx.user_id()?;
        let mut query = Query::table(tables::ACTIONS)
            .filter(Filter::eq("hive_id", hive_id.to_string()))
            .filter(Filter::eq("user_id", user_id.to_string()))
            .order_by("performed_at", Direction::Desc)
            .order_by("created_at", Direction::Desc);
        if let Some(kind) = kind {
            query = query.filter(Filter::eq("kind", kind.as_str()));
        }
        let actions = self.ctx.select::<Action>(&query)?;
        let records = self.hydrate(actions)?;
        info!(
            "event=action_list module=service status=ok hive_id={} count={}",
            hive_id,
            records.len()
        );
        Ok(records)
    }

    pub fn get_action(&self, action_id: ActionId) -> ServiceResult<ActionRecord> {
        let action = self.fetch_action(action_id)?;
        self.hydrate(vec![action])?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("action", action_id))
    }

    /// Deletes the detail row(s) and then the action.
    pub fn delete_action(&self, action_id: ActionId) -> ServiceResult<WriteOutcome<()>> {
        let user_id = self.ctx.user_id()?;
        self.ctx.sync_pending()?;
        let kinds = match self.fetch_action(action_id) {
            Ok(action) => vec![action.kind],
            Err(err) if self.ctx.tolerates_offline(&err) => ActionKind::ALL.to_vec(),
            Err(err) => return Err(err),
        };

        let mut pending_sync = false;
        for kind in kinds {
            pending_sync |= self
                .ctx
                .dispatch(PendingMutation::delete(
                    kind.detail_table(),
                    vec![Filter::eq("action_id", action_id.to_string())],
                ))?
                .is_queued();
        }
        pending_sync |= self
            .ctx
            .dispatch(PendingMutation::delete(
                tables::ACTIONS,
                owned_by(action_id, user_id),
            ))?
            .is_queued();

        info!(
            "event=action_delete module=service status=ok action_id={} pending_sync={}",
            action_id, pending_sync
        );
        Ok(WriteOutcome {
            record: (),
            pending_sync,
        })
    }

    /// Records a sale, donation or loss and moves the hive to the matching
    /// status.
    pub fn record_transaction(
        &self,
        input: NewTransaction,
    ) -> ServiceResult<WriteOutcome<Transaction>> {
        let user_id = self.ctx.user_id()?;
        let transaction = Transaction::from_new(user_id, input, now_epoch_ms());
        transaction.validate()?;
        self.require_active_hive(transaction.hive_id, true)?;

        let mut pending_sync = self
            .ctx
            .dispatch(PendingMutation::insert(
                tables::TRANSACTIONS,
                to_row(&transaction)?,
            ))?
            .is_queued();
        pending_sync |= self
            .hives()
            .update_status(transaction.hive_id, transaction.kind.resulting_status())?
            .pending_sync;

        info!(
            "event=transaction_record module=service status=ok transaction_id={} hive_id={} kind={} pending_sync={}",
            transaction.id,
            transaction.hive_id,
            transaction.kind.as_str(),
            pending_sync
        );
        Ok(WriteOutcome {
            record: transaction,
            pending_sync,
        })
    }

    /// Transactions of a hive, newest first.
    pub fn list_transactions(&self, hive_id: HiveId) -> ServiceResult<Vec<Transaction>> {
        let user_id = self.ctx.user_id()?;
        let query = Query::table(tables::TRANSACTIONS)
            .filter(Filter::eq("hive_id", hive_id.to_string()))
            .filter(Filter::eq("user_id", user_id.to_string()))
            .order_by("occurred_at", Direction::Desc)
            .order_by("created_at", Direction::Desc);
        self.ctx.select(&query)
    }

    /// Deletes a transaction and recomputes the hive status.
    ///
    /// Needs the backend: the new status depends on the remaining rows.
    pub fn delete_transaction(
        &self,
        transaction_id: Uuid,
    ) -> ServiceResult<WriteOutcome<HiveStatus>> {
        let user_id = self.ctx.user_id()?;
        self.ctx.sync_pending()?;
        let query = Query::table(tables::TRANSACTIONS)
            .filter(Filter::eq("id", transaction_id.to_string()))
            .filter(Filter::eq("user_id", user_id.to_string()))
            .limit(1);
        let transaction = self
            .ctx
            .select::<Transaction>(&query)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("transaction", transaction_id))?;

        let mut pending_sync = self
            .ctx
            .dispatch(PendingMutation::delete(
                tables::TRANSACTIONS,
                owned_by(transaction_id, user_id),
            ))?
            .is_queued();
        let status = self
            .list_transactions(transaction.hive_id)?
            .into_iter()
            .find(|remaining| remaining.id != transaction_id)
            .map_or(HiveStatus::Active, |latest| latest.kind.resulting_status());
        pending_sync |= self
            .hives()
            .update_status(transaction.hive_id, status)?
            .pending_sync;

        info!(
            "event=transaction_delete module=service status=ok transaction_id={} hive_status={} pending_sync={}",
            transaction_id,
            status.as_str(),
            pending_sync
        );
        Ok(WriteOutcome {
            record: status,
            pending_sync,
        })
    }

    /// Actions and transactions of a hive merged into one feed, newest first.
    pub fn hive_timeline(&self, hive_id: HiveId) -> ServiceResult<Vec<TimelineEntry>> {
        let user_id = self.ctx.user_id()?;
        let actions = self.ctx.select::<Action>(
            &Query::table(tables::ACTIONS)
                .filter(Filter::eq("hive_id", hive_id.to_string()))
                .filter(Filter::eq("user_id", user_id.to_string())),
        )?;
        let kinds = actions
            .iter()
            .map(|action| action.kind)
            .collect::<BTreeSet<_>>();
        let mut details = Vec::new();
        for kind in kinds {
            details.extend(self.ctx.select::<ActionDetailRecord>(
                &Query::table(kind.detail_table())
                    .filter(Filter::eq("hive_id", hive_id.to_string())),
            )?);
        }
        let transactions = self.list_transactions(hive_id)?;

        let entries = merge_timeline(actions, details, transactions);
        info!(
            "event=hive_timeline module=service status=ok hive_id={} count={}",
            hive_id,
            entries.len()
        );
        Ok(entries)
    }

    /// Loads the hive and rejects non-active ones.
    ///
    /// With `tolerate_offline`, an unreachable backend yields `Ok(None)` so
    /// the write can still be queued.
    ///
    /// Queued writes are replayed first; a status change still waiting in the
    /// queue overrides the remote one.
    fn require_active_hive(
        &self,
        hive_id: HiveId,
        tolerate_offline: bool,
    ) -> ServiceResult<Option<Hive>> {
        self.ctx.sync_pending()?;
        let queued_status = self
            .ctx
            .queued_value(tables::HIVES, &hive_id.to_string(), "status")?
            .and_then(|value| serde_json::from_value::<HiveStatus>(value).ok());

        let hive = match self.hives().get_hive(hive_id) {
            Ok(mut hive) => {
                if let Some(status) = queued_status {
                    hive.status = status;
                }
                Some(hive)
            }
            Err(err) if tolerate_offline && self.ctx.tolerates_offline(&err) => None,
            Err(err) => return Err(err),
        };
        match hive.as_ref().map(|hive| hive.status).or(queued_status) {
            Some(status) if status != HiveStatus::Active => Err(ServiceError::InvalidState(
                format!(
                    "This hive is {} and no longer accepts new records.",
                    status.as_str()
                ),
            )),
            _ => Ok(hive),
        }
    }

    fn fetch_action(&self, action_id: ActionId) -> ServiceResult<Action> {
        let user_id = self.ctx.user_id()?;
        let query = Query::table(tables::ACTIONS)
            .filter(Filter::eq("id", action_id.to_string()))
            .filter(Filter::eq("user_id", user_id.to_string()))
            .limit(1);
        self.ctx
            .select::<Action>(&query)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("action", action_id))
    }

    fn hydrate(&self, actions: Vec<Action>) -> ServiceResult<Vec<ActionRecord>> {
        let mut ids_by_kind: HashMap<ActionKind, Vec<String>> = HashMap::new();
        for action in &actions {
            ids_by_kind
                .entry(action.kind)
                .or_default()
                .push(action.id.to_string());
        }

        let mut details: HashMap<ActionId, ActionDetail> = HashMap::new();
        for (kind, ids) in ids_by_kind {
            let rows = self.ctx.select::<ActionDetailRecord>(
                &Query::table(kind.detail_table()).filter(Filter::is_in("action_id", ids)),
            )?;
            for record in rows {
                details.entry(record.action_id).or_insert(record.detail);
            }
        }

        Ok(actions
            .into_iter()
            .map(|action| {
                let detail = details
                    .remove(&action.id)
                    .filter(|detail| detail.kind() == action.kind);
                ActionRecord { action, detail }
            })
            .collect())
    }
}

fn owned_by(id: Uuid, user_id: UserId) -> Vec<Filter> {
    vec![
        Filter::eq("id", id.to_string()),
        Filter::eq("user_id", user_id.to_string()),
    ]
}
