//! Beekeeper profile service.
//!
//! The profile row shares its id with the user, so there is at most one per
//! account. Edits read the current row first and need the backend.

use super::storage_service::StorageService;
use super::{ServiceContext, ServiceError, ServiceResult, WriteOutcome};
use crate::gateway::{from_row, tables, to_row, Filter, GatewayError, Query, RemoteGateway};
use crate::model::profile::{Profile, ProfileUpdate};
use crate::model::{now_epoch_ms, UserId};
use crate::queue::{Dispatched, MutationOutcome, PendingMutation};
use log::{info, warn};

pub struct ProfileService<'a, G: RemoteGateway + ?Sized> {
    ctx: ServiceContext<'a, G>,
}

impl<'a, G: RemoteGateway + ?Sized> ProfileService<'a, G> {
    pub fn new(ctx: ServiceContext<'a, G>) -> Self {
        Self { ctx }
    }

    pub fn get_profile(&self) -> ServiceResult<Option<Profile>> {
        let user_id = self.ctx.user_id()?;
        self.fetch(user_id)
    }

    /// Returns the profile, creating an empty one on first use.
    pub fn ensure_profile(&self) -> ServiceResult<WriteOutcome<Profile>> {
        let user_id = self.ctx.user_id()?;
        if let Some(profile) = self.fetch(user_id)? {
            return Ok(WriteOutcome {
                record: profile,
                pending_sync: false,
            });
        }

        let profile = Profile::empty(user_id, now_epoch_ms());
        let outcome = match self
            .ctx
            .dispatch(PendingMutation::insert(tables::PROFILES, to_row(&profile)?))?
        {
            Dispatched::Applied(MutationOutcome::Inserted(row)) => WriteOutcome {
                record: from_row(row)?,
                pending_sync: false,
            },
            Dispatched::Applied(_) => WriteOutcome {
                record: profile,
                pending_sync: false,
            },
            Dispatched::Queued(_) => WriteOutcome {
                record: profile,
                pending_sync: true,
            },
        };
        info!("event=profile_create module=service status=ok");
        Ok(outcome)
    }

    pub fn update_profile(&self, update: ProfileUpdate) -> ServiceResult<WriteOutcome<Profile>> {
        let current = self.ensure_profile()?;
        let mut profile = current.record;
        profile.apply(update, now_epoch_ms())?;
        let outcome = self.save(profile)?;
        info!(
            "event=profile_update module=service status=ok pending_sync={}",
            outcome.pending_sync
        );
        Ok(WriteOutcome {
            record: outcome.record,
            pending_sync: outcome.pending_sync || current.pending_sync,
        })
    }

    /// Uploads a new avatar, stores its URL and removes the previous one.
    pub fn set_avatar(&self, file_name: &str, bytes: &[u8]) -> ServiceResult<WriteOutcome<Profile>> {
        let current = self.ensure_profile()?.record;
        let user_segment = current.id.to_string();
        let storage = StorageService::new(self.ctx);
        let stored = storage.upload_image(
            tables::AVATARS_BUCKET,
            &[user_segment.as_str()],
            file_name,
            bytes,
        )?;

        let previous = current.avatar_url.clone();
        let mut profile = current;
        profile.avatar_url = Some(stored.public_url.clone());
        profile.updated_at = now_epoch_ms();
        let outcome = self.save(profile)?;

        if let Some(url) = previous.filter(|url| *url != stored.public_url) {
            if let Err(err) = storage.delete_by_public_url(tables::AVATARS_BUCKET, &url) {
                warn!("event=profile_avatar_remove module=service status=error error={err}");
            }
        }
        info!(
            "event=profile_avatar module=service status=ok pending_sync={}",
            outcome.pending_sync
        );
        Ok(outcome)
    }

    fn fetch(&self, user_id: UserId) -> ServiceResult<Option<Profile>> {
        let query = Query::table(tables::PROFILES)
            .filter(Filter::eq("id", user_id.to_string()))
            .limit(1);
        Ok(self.ctx.select::<Profile>(&query)?.into_iter().next())
    }

    fn save(&self, profile: Profile) -> ServiceResult<WriteOutcome<Profile>> {
        let mut patch = to_row(&profile)?;
        patch.remove("id");
        let filters = vec![Filter::eq("id", profile.id.to_string())];
        match self
            .ctx
            .dispatch(PendingMutation::update(tables::PROFILES, filters, patch))?
        {
            Dispatched::Applied(MutationOutcome::Updated(rows)) => {
                let row = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| ServiceError::not_found("profile", profile.id))?;
                Ok(WriteOutcome {
                    record: from_row(row)?,
                    pending_sync: false,
                })
            }
            Dispatched::Applied(_) => Err(GatewayError::InvalidResponse(
                "update returned a non-update outcome".to_string(),
            )
            .into()),
            Dispatched::Queued(_) => Ok(WriteOutcome {
                record: profile,
                pending_sync: true,
            }),
        }
    }
}
