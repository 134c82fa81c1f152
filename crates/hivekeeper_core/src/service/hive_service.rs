//! Hive use-case service.
//!
//! # Responsibility
//! - Create, read, list, update and delete hives of the signed-in user.
//! - Cascade hive deletion over its history and photo.
//! - Project hives onto map markers and expose the realtime feed.
//!
//! # Invariants
//! - Lists are ordered by `created_at DESC, id ASC`.
//! - Cascade order: action details, actions, transactions, hive, photos.
//! - Photos live under `{user_id}/{hive_id}/`; deleting a hive clears that
//!   folder, queued like any other write when offline.
//! - Photo removal is best effort; a leftover object never fails a delete.

use super::storage_service::StorageService;
use super::{ServiceContext, ServiceError, ServiceResult, WriteOutcome};
use crate::gateway::{
    from_row, tables, to_row, Direction, Filter, GatewayError, Query, RemoteGateway, Row,
    Subscription,
};
use crate::model::action::ActionKind;
use crate::model::hive::{
    GeoPoint, Hive, HiveId, HiveOrigin, HiveStatus, NewHive, MAX_HIVE_NAME_CHARS,
};
use crate::model::validation::require_text;
use crate::model::{normalize_optional_text, now_epoch_ms, UserId, ValidationError};
use crate::processing::map::{hive_markers, HiveMarker};
use crate::queue::{Dispatched, MutationOutcome, PendingMutation};
use log::{info, warn};
use serde_json::Value;

pub const DEFAULT_HIVE_LIMIT: u32 = 200;
pub const MAX_HIVE_LIMIT: u32 = 1_000;

/// Filters for listing hives; all criteria are combined with AND.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HiveListQuery {
    pub status: Option<HiveStatus>,
    pub species: Option<String>,
    /// Case-insensitive substring of the hive name.
    pub name_contains: Option<String>,
    pub limit: Option<u32>,
}

/// Partial hive edit; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HiveUpdate {
    pub name: Option<String>,
    pub species: Option<String>,
    pub origin: Option<HiveOrigin>,
    /// `Some("")` clears the box type.
    pub box_type: Option<String>,
    /// `Some(None)` clears the location.
    pub location: Option<Option<GeoPoint>>,
    /// `Some("")` clears the notes.
    pub notes: Option<String>,
    pub acquired_at: Option<i64>,
}

impl HiveUpdate {
    fn into_patch(self) -> Result<Row, ValidationError> {
        let mut patch = Row::new();
        if let Some(name) = self.name {
            require_text("name", &name, MAX_HIVE_NAME_CHARS)?;
            patch.insert("name".to_string(), Value::from(name.trim()));
        }
        if let Some(species) = self.species {
            require_text("species", &species, MAX_HIVE_NAME_CHARS)?;
            patch.insert("species".to_string(), Value::from(species.trim()));
        }
        if let Some(origin) = self.origin {
            patch.insert("origin".to_string(), Value::from(origin.as_str()));
        }
        if let Some(box_type) = self.box_type {
            patch.insert(
                "box_type".to_string(),
                normalize_optional_text(Some(box_type)).map_or(Value::Null, Value::from),
            );
        }
        if let Some(location) = self.location {
            let (latitude, longitude) = match location {
                Some(point) => {
                    let point = GeoPoint::new(point.latitude, point.longitude)?;
                    (Value::from(point.latitude), Value::from(point.longitude))
                }
                None => (Value::Null, Value::Null),
            };
            patch.insert("latitude".to_string(), latitude);
            patch.insert("longitude".to_string(), longitude);
        }
        if let Some(notes) = self.notes {
            patch.insert(
                "notes".to_string(),
                normalize_optional_text(Some(notes)).map_or(Value::Null, Value::from),
            );
        }
        if let Some(acquired_at) = self.acquired_at {
            patch.insert("acquired_at".to_string(), Value::from(acquired_at));
        }
        if patch.is_empty() {
            return Err(ValidationError::Missing("at least one field to update"));
        }
        Ok(patch)
    }
}

pub struct HiveService<'a, G: RemoteGateway + ?Sized> {
    ctx: ServiceContext<'a, G>,
}

impl<'a, G: RemoteGateway + ?Sized> HiveService<'a, G> {
    pub fn new(ctx: ServiceContext<'a, G>) -> Self {
        Self { ctx }
    }

    pub fn create_hive(&self, input: NewHive) -> ServiceResult<WriteOutcome<Hive>> {
        let user_id = self.ctx.user_id()?;
        let hive = Hive::from_new(user_id, input, now_epoch_ms());
        hive.validate()?;

        let dispatched = self
            .ctx
            .dispatch(PendingMutation::insert(tables::HIVES, to_row(&hive)?))?;
        let outcome = match dispatched {
            Dispatched::Applied(MutationOutcome::Inserted(row)) => WriteOutcome {
                record: from_row(row)?,
                pending_sync: false,
            },
            Dispatched::Applied(_) => WriteOutcome {
                record: hive,
                pending_sync: false,
            },
            Dispatched::Queued(_) => WriteOutcome {
                record: hive,
                pending_sync: true,
            },
        };
        info!(
            "event=hive_create module=service status=ok hive_id={} pending_sync={}",
            outcome.record.id, outcome.pending_sync
        );
        Ok(outcome)
    }

    pub fn get_hive(&self, hive_id: HiveId) -> ServiceResult<Hive> {
        let user_id = self.ctx.user_id()?;
        let query = Query::table(tables::HIVES)
            .filter(Filter::eq("id", hive_id.to_string()))
            .filter(Filter::eq("user_id", user_id.to_string()))
            .limit(1);
        self.ctx
            .select::<Hive>(&query)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("hive", hive_id))
    }

    /// Hives of the signed-in user, newest first.
    pub fn list_hives(&self, query: &HiveListQuery) -> ServiceResult<Vec<Hive>> {
        let user_id = self.ctx.user_id()?;
        let limit = normalize_limit(query.limit);
        let mut remote = Query::table(tables::HIVES)
            .filter(Filter::eq("user_id", user_id.to_string()))
            .order_by("created_at", Direction::Desc)
            .order_by("id", Direction::Asc);
        if let Some(status) = query.status {
            remote = remote.filter(Filter::eq("status", status.as_str()));
        }
        if let Some(species) = normalize_optional_text(query.species.clone()) {
            remote = remote.filter(Filter::eq("species", species));
        }

        let needle = normalize_optional_text(query.name_contains.clone())
            .map(|needle| needle.to_lowercase());
        let hives = match needle {
            None => self.ctx.select::<Hive>(&remote.limit(limit))?,
            Some(needle) => self
                .ctx
                .select::<Hive>(&remote)?
                .into_iter()
                .filter(|hive| hive.name.to_lowercase().contains(&needle))
                .take(limit as usize)
                .collect(),
        };
        info!(
            "event=hive_list module=service status=ok count={} limit={}",
            hives.len(),
            limit
        );
        Ok(hives)
    }

    /// Applies a partial edit; the record is `None` when the edit was queued.
    pub fn update_hive(
        &self,
        hive_id: HiveId,
        update: HiveUpdate,
    ) -> ServiceResult<WriteOutcome<Option<Hive>>> {
        let user_id = self.ctx.user_id()?;
        let patch = update.into_patch()?;
        let outcome = self.apply_patch(hive_id, user_id, patch)?;
        info!(
            "event=hive_update module=service status=ok hive_id={} pending_sync={}",
            hive_id, outcome.pending_sync
        );
        Ok(outcome)
    }

    /// Sets the lifecycle status directly.
    ///
    /// Transactions call this after recording a sale, donation or loss.
    pub fn update_status(
        &self,
        hive_id: HiveId,
        status: HiveStatus,
    ) -> ServiceResult<WriteOutcome<Option<Hive>>> {
        let user_id = self.ctx.user_id()?;
        let mut patch = Row::new();
        patch.insert("status".to_string(), Value::from(status.as_str()));
        let outcome = self.apply_patch(hive_id, user_id, patch)?;
        info!(
            "event=hive_status module=service status=ok hive_id={} hive_status={} pending_sync={}",
            hive_id,
            status.as_str(),
            outcome.pending_sync
        );
        Ok(outcome)
    }

    /// Deletes the hive with its details, actions, transactions and photo.
    pub fn delete_hive(&self, hive_id: HiveId) -> ServiceResult<WriteOutcome<()>> {
        let user_id = self.ctx.user_id()?;
        self.ctx.sync_pending()?;
        match self.get_hive(hive_id) {
            Ok(_) => {}
            Err(err) if self.ctx.tolerates_offline(&err) => {}
            Err(err) => return Err(err),
        }

        let by_hive = || vec![Filter::eq("hive_id", hive_id.to_string())];
        let mut steps = ActionKind::ALL
            .iter()
            .map(|kind| PendingMutation::delete(kind.detail_table(), by_hive()))
            .collect::<Vec<_>>();
        let mut owned = by_hive();
        owned.push(Filter::eq("user_id", user_id.to_string()));
        steps.push(PendingMutation::delete(tables::ACTIONS, owned.clone()));
        steps.push(PendingMutation::delete(tables::TRANSACTIONS, owned));
        steps.push(PendingMutation::delete(
            tables::HIVES,
            vec![
                Filter::eq("id", hive_id.to_string()),
                Filter::eq("user_id", user_id.to_string()),
            ],
        ));

        let mut pending_sync = false;
        for step in steps {
            pending_sync |= self.ctx.dispatch(step)?.is_queued();
        }

        // Every photo of the hive lives under its folder, known even offline.
        match self.ctx.dispatch(PendingMutation::remove_folder(
            tables::HIVE_PHOTOS_BUCKET,
            &photo_folder(user_id, hive_id),
        )) {
            Ok(dispatched) => pending_sync |= dispatched.is_queued(),
            Err(err) => {
                warn!("event=hive_photo_remove module=service status=error hive_id={hive_id} error={err}");
            }
        }
        info!(
            "event=hive_delete module=service status=ok hive_id={} pending_sync={}",
            hive_id, pending_sync
        );
        Ok(WriteOutcome {
            record: (),
            pending_sync,
        })
    }

    /// Uploads a new hive photo and points the hive at it.
    ///
    /// The previous photo is removed once the hive references the new one.
    pub fn set_photo(
        &self,
        hive_id: HiveId,
        file_name: &str,
        bytes: &[u8],
    ) -> ServiceResult<WriteOutcome<Option<Hive>>> {
        let user_id = self.ctx.user_id()?;
        self.ctx.sync_pending()?;
        let previous = self.get_hive(hive_id)?.photo_url;
        let user_segment = user_id.to_string();
        let hive_segment = hive_id.to_string();
        let stored = StorageService::new(self.ctx).upload_image(
            tables::HIVE_PHOTOS_BUCKET,
            &[user_segment.as_str(), hive_segment.as_str()],
            file_name,
            bytes,
        )?;

        let mut patch = Row::new();
        patch.insert("photo_url".to_string(), Value::from(stored.public_url.as_str()));
        let outcome = self.apply_patch(hive_id, user_id, patch)?;
        if let Some(url) = previous.filter(|url| *url != stored.public_url) {
            self.remove_photo(&url);
        }
        info!(
            "event=hive_photo module=service status=ok hive_id={} pending_sync={}",
            hive_id, outcome.pending_sync
        );
        Ok(outcome)
    }

    /// Map markers for the user's active hives that have coordinates.
    pub fn map_markers(&self) -> ServiceResult<Vec<HiveMarker>> {
        let hives = self.list_hives(&HiveListQuery {
            status: Some(HiveStatus::Active),
            limit: Some(MAX_HIVE_LIMIT),
            ..HiveListQuery::default()
        })?;
        Ok(hive_markers(&hives))
    }

    /// Change feed of the hives table.
    pub fn watch_hives(&self) -> ServiceResult<Subscription> {
        self.ctx.user_id()?;
        Ok(self.ctx.gateway().subscribe(tables::HIVES)?)
    }

    fn apply_patch(
        &self,
        hive_id: HiveId,
        user_id: UserId,
        patch: Row,
    ) -> ServiceResult<WriteOutcome<Option<Hive>>> {
        let filters = vec![
            Filter::eq("id", hive_id.to_string()),
            Filter::eq("user_id", user_id.to_string()),
        ];
        match self
            .ctx
            .dispatch(PendingMutation::update(tables::HIVES, filters, patch))?
        {
            Dispatched::Applied(MutationOutcome::Updated(rows)) => {
                let row = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| ServiceError::not_found("hive", hive_id))?;
                Ok(WriteOutcome {
                    record: Some(from_row(row)?),
                    pending_sync: false,
                })
            }
            Dispatched::Applied(_) => Err(GatewayError::InvalidResponse(
                "update returned a non-update outcome".to_string(),
            )
            .into()),
            Dispatched::Queued(_) => Ok(WriteOutcome {
                record: None,
                pending_sync: true,
            }),
        }
    }

    fn remove_photo(&self, url: &str) {
        if let Err(err) =
            StorageService::new(self.ctx).delete_by_public_url(tables::HIVE_PHOTOS_BUCKET, url)
        {
            warn!("event=hive_photo_remove module=service status=error error={err}");
        }
    }
}

/// Storage folder holding a hive's photos: `{user_id}/{hive_id}`.
fn photo_folder(user_id: UserId, hive_id: HiveId) -> String {
    format!("{user_id}/{hive_id}")
}

fn normalize_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_HIVE_LIMIT).clamp(1, MAX_HIVE_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::{normalize_limit, HiveListQuery, HiveService, HiveUpdate, DEFAULT_HIVE_LIMIT};
    use crate::db::open_db_in_memory;
    use crate::gateway::{EmbeddedGateway, Session};
    use crate::model::hive::{GeoPoint, HiveStatus, NewHive};
    use crate::model::ValidationError;
    use crate::queue::OfflineQueue;
    use crate::service::{ServiceContext, ServiceError};
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            access_token: "token".to_string(),
            expires_at_ms: None,
        }
    }

    fn new_hive(name: &str) -> NewHive {
        NewHive {
            name: name.to_string(),
            species: "jatai".to_string(),
            ..NewHive::default()
        }
    }

    #[test]
    fn normalize_limit_applies_default_and_bounds() {
        assert_eq!(normalize_limit(None), DEFAULT_HIVE_LIMIT);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(50_000)), super::MAX_HIVE_LIMIT);
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(matches!(
            HiveUpdate::default().into_patch(),
            Err(ValidationError::Missing(_))
        ));
    }

    #[test]
    fn update_hive_merges_fields_and_clears_location() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn).with_session(session());
        let service = HiveService::new(ServiceContext::new(&gateway));

        let created = service
            .create_hive(NewHive {
                location: Some(GeoPoint::new(-23.0, -46.0).unwrap()),
                ..new_hive("Jataí 1")
            })
            .unwrap()
            .record;

        let updated = service
            .update_hive(
                created.id,
                HiveUpdate {
                    name: Some("  Jataí do quintal ".to_string()),
                    location: Some(None),
                    ..HiveUpdate::default()
                },
            )
            .unwrap()
            .record
            .unwrap();
        assert_eq!(updated.name, "Jataí do quintal");
        assert_eq!(updated.location(), None);
        assert_eq!(updated.species, "jatai");
    }

    #[test]
    fn hives_of_other_users_are_invisible() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn).with_session(session());
        let service = HiveService::new(ServiceContext::new(&gateway));
        let hive = service.create_hive(new_hive("mine")).unwrap().record;

        gateway.set_session(Some(session()));
        assert!(matches!(
            service.get_hive(hive.id),
            Err(ServiceError::NotFound { entity: "hive", .. })
        ));
        assert!(service
            .list_hives(&HiveListQuery::default())
            .unwrap()
            .is_empty());
        assert!(matches!(
            service.update_status(hive.id, HiveStatus::Lost),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn create_while_offline_is_queued_and_replayed() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn).with_session(session());
        let queue = OfflineQueue::new(&conn);
        let service = HiveService::new(ServiceContext::with_queue(&gateway, &queue));

        gateway.set_online(false);
        let outcome = service.create_hive(new_hive("offline")).unwrap();
        assert!(outcome.pending_sync);
        assert_eq!(queue.len().unwrap(), 1);

        gateway.set_online(true);
        queue.flush(&gateway).unwrap();
        assert_eq!(service.get_hive(outcome.record.id).unwrap().name, "offline");
    }

    #[test]
    fn missing_session_is_unauthenticated() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        let service = HiveService::new(ServiceContext::new(&gateway));
        assert!(matches!(
            service.create_hive(new_hive("x")),
            Err(ServiceError::Unauthenticated)
        ));
    }
}
