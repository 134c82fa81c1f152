//! Dashboard statistics for the signed-in user.

use super::{ServiceContext, ServiceResult};
use crate::gateway::{tables, Filter, Query, RemoteGateway};
use crate::model::action::{Action, ActionDetailRecord, ActionKind};
use crate::model::hive::Hive;
use crate::model::transaction::Transaction;
use crate::processing::stats::{aggregate, DashboardStats, StatsInput};
use log::info;
use std::time::Instant;

pub struct StatsService<'a, G: RemoteGateway + ?Sized> {
    ctx: ServiceContext<'a, G>,
}

impl<'a, G: RemoteGateway + ?Sized> StatsService<'a, G> {
    pub fn new(ctx: ServiceContext<'a, G>) -> Self {
        Self { ctx }
    }

    pub fn dashboard(&self, now_ms: i64) -> ServiceResult<DashboardStats> {
        let started_at = Instant::now();
        let user_id = self.ctx.user_id()?.to_string();
        let owned = |table: &str| Query::table(table).filter(Filter::eq("user_id", user_id.as_str()));

        let hives = self.ctx.select::<Hive>(&owned(tables::HIVES))?;
        let actions = self.ctx.select::<Action>(&owned(tables::ACTIONS))?;
        // Detail rows carry no owner column; scope them by the user's hives.
        let harvests = if hives.is_empty() {
            Vec::new()
        } else {
            self.ctx.select::<ActionDetailRecord>(
                &Query::table(ActionKind::Harvest.detail_table()).filter(Filter::is_in(
                    "hive_id",
                    hives.iter().map(|hive| hive.id.to_string()),
                )),
            )?
        };
        let transactions = self.ctx.select::<Transaction>(&owned(tables::TRANSACTIONS))?;

        let stats = aggregate(
            &StatsInput {
                hives,
                actions,
                harvests,
                transactions,
            },
            now_ms,
        );
        info!(
            "event=stats_dashboard module=service status=ok hives={} duration_ms={}",
            stats.total_hives,
            started_at.elapsed().as_millis()
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::StatsService;
    use crate::db::open_db_in_memory;
    use crate::gateway::{EmbeddedGateway, Session};
    use crate::model::action::{ActionDetail, NewAction};
    use crate::model::hive::{HiveStatus, NewHive};
    use crate::model::transaction::{NewTransaction, TransactionKind};
    use crate::service::action_service::ActionService;
    use crate::service::hive_service::HiveService;
    use crate::service::ServiceContext;
    use uuid::Uuid;

    const NOW: i64 = 1_800_000_000_000;

    #[test]
    fn dashboard_aggregates_only_the_users_records() {
        let conn = open_db_in_memory().unwrap();
        let owner = Session {
            user_id: Uuid::new_v4(),
            access_token: "token".to_string(),
            expires_at_ms: None,
        };
        let gateway = EmbeddedGateway::new(&conn).with_session(owner.clone());
        let ctx = ServiceContext::new(&gateway);
        let hives = HiveService::new(ctx);
        let actions = ActionService::new(ctx);

        let kept = hives
            .create_hive(NewHive {
                name: "kept".to_string(),
                species: "jatai".to_string(),
                ..NewHive::default()
            })
            .unwrap()
            .record;
        let sold = hives
            .create_hive(NewHive {
                name: "sold".to_string(),
                species: "urucu".to_string(),
                ..NewHive::default()
            })
            .unwrap()
            .record;
        actions
            .record_action(NewAction {
                hive_id: kept.id,
                performed_at: Some(NOW - 1_000),
                notes: None,
                detail: ActionDetail::Harvest {
                    honey_ml: 750.0,
                    wax_g: None,
                    pollen_g: None,
                },
            })
            .unwrap();
        actions
            .record_transaction(NewTransaction {
                hive_id: sold.id,
                kind: TransactionKind::Sale,
                occurred_at: Some(NOW - 500),
                amount: Some(200.0),
                counterparty: Some("Bia".to_string()),
                reason: None,
                notes: None,
            })
            .unwrap();

        gateway.set_session(Some(Session {
            user_id: Uuid::new_v4(),
            ..owner.clone()
        }));
        hives
            .create_hive(NewHive {
                name: "someone else".to_string(),
                species: "jatai".to_string(),
                ..NewHive::default()
            })
            .unwrap();
        gateway.set_session(Some(owner));

        let stats = StatsService::new(ctx).dashboard(NOW).unwrap();
        assert_eq!(stats.total_hives, 2);
        assert_eq!(stats.active_hives, 1);
        assert_eq!(stats.hives_by_status[&HiveStatus::Sold], 1);
        assert_eq!(stats.honey_harvested_ml, 750.0);
        assert_eq!(stats.sales_revenue, 200.0);
        assert_eq!(stats.actions_last_30_days, 1);
        assert_eq!(stats.last_activity_at, Some(NOW - 500));
    }
}
