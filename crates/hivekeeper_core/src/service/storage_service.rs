//! Image upload/removal against the backend's object storage.
//!
//! # Invariants
//! - Object paths are `<segment>/.../<millis>_<file_name>`; every segment
//!   matches `SEGMENT_RE`, so paths never escape their bucket.
//! - Uploads are never queued; they need a reachable backend.

use super::{ServiceContext, ServiceResult};
use crate::gateway::RemoteGateway;
use crate::model::{now_epoch_ms, ValidationError};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("valid segment regex"));
static FILE_STEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("valid file stem regex"));

/// Where an uploaded object landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub path: String,
    pub public_url: String,
}

/// MIME type for a supported image file name, by extension.
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

pub struct StorageService<'a, G: RemoteGateway + ?Sized> {
    ctx: ServiceContext<'a, G>,
}

impl<'a, G: RemoteGateway + ?Sized> StorageService<'a, G> {
    pub fn new(ctx: ServiceContext<'a, G>) -> Self {
        Self { ctx }
    }

    /// Uploads an image under `owner_segments` and returns its location.
    pub fn upload_image(
        &self,
        bucket: &str,
        owner_segments: &[&str],
        file_name: &str,
        bytes: &[u8],
    ) -> ServiceResult<StoredObject> {
        self.ctx.user_id()?;
        if bytes.is_empty() {
            return Err(ValidationError::Blank("image").into());
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ValidationError::OutOfRange {
                field: "image",
                expected: "at most 10 MiB",
            }
            .into());
        }
        let content_type = content_type_for(file_name).ok_or(ValidationError::OutOfRange {
            field: "file_name",
            expected: "a jpg, jpeg, png, webp or heic file",
        })?;
        let path = object_path(owner_segments, file_name, now_epoch_ms())?;

        info!(
            "event=storage_upload module=service status=start bucket={bucket} bytes={}",
            bytes.len()
        );
        let public_url = self
            .ctx
            .gateway()
            .upload(bucket, &path, content_type, bytes)
            .map_err(|err| {
                warn!("event=storage_upload module=service status=error bucket={bucket} error={err}");
                err
            })?;
        info!("event=storage_upload module=service status=ok bucket={bucket}");

        Ok(StoredObject {
            bucket: bucket.to_string(),
            path,
            public_url,
        })
    }

    /// Object path inside `bucket` that `url` points to, if it belongs there.
    pub fn object_path_from_url(&self, bucket: &str, url: &str) -> Option<String> {
        let prefix = self.ctx.gateway().public_url(bucket, "");
        let path = url.strip_prefix(prefix.as_str())?;
        let path = path.split(['?', '#']).next().unwrap_or_default();
        if path.is_empty() || path.split('/').any(|segment| segment.is_empty() || segment == "..")
        {
            return None;
        }
        Some(path.to_string())
    }

    /// Removes the object behind `url`; returns `false` for foreign URLs.
    pub fn delete_by_public_url(&self, bucket: &str, url: &str) -> ServiceResult<bool> {
        self.ctx.user_id()?;
        let Some(path) = self.object_path_from_url(bucket, url) else {
            return Ok(false);
        };
        self.ctx.gateway().remove_object(bucket, &path)?;
        info!("event=storage_remove module=service status=ok bucket={bucket}");
        Ok(true)
    }
}

fn object_path(
    owner_segments: &[&str],
    file_name: &str,
    now_ms: i64,
) -> Result<String, ValidationError> {
    if owner_segments.is_empty() {
        return Err(ValidationError::Missing("owner path"));
    }
    let invalid_segment = ValidationError::OutOfRange {
        field: "owner path",
        expected: "letters, digits, '-' or '_'",
    };
    if owner_segments
        .iter()
        .any(|segment| !SEGMENT_RE.is_match(segment))
    {
        return Err(invalid_segment);
    }

    let (stem, extension) = file_name
        .rsplit_once('.')
        .ok_or(ValidationError::Missing("file extension"))?;
    let stem = FILE_STEM_RE.replace_all(stem.trim(), "_");
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "image" } else { stem };

    Ok(format!(
        "{}/{now_ms}_{stem}.{}",
        owner_segments.join("/"),
        extension.to_ascii_lowercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::{content_type_for, object_path, StorageService, MAX_IMAGE_BYTES};
    use crate::db::open_db_in_memory;
    use crate::gateway::{EmbeddedGateway, Session};
    use crate::service::{ServiceContext, ServiceError};
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            access_token: "token".to_string(),
            expires_at_ms: None,
        }
    }

    #[test]
    fn content_type_follows_extension_case_insensitively() {
        assert_eq!(content_type_for("hive.JPG"), Some("image/jpeg"));
        assert_eq!(content_type_for("hive.heic"), Some("image/heic"));
        assert_eq!(content_type_for("hive.gif"), None);
        assert_eq!(content_type_for("hive"), None);
    }

    #[test]
    fn object_path_sanitizes_file_stem_and_rejects_traversal() {
        assert_eq!(
            object_path(&["user", "hive"], "My Photo!.PNG", 42).unwrap(),
            "user/hive/42_My_Photo.png"
        );
        assert!(object_path(&["..", "hive"], "a.png", 1).is_err());
        assert!(object_path(&[], "a.png", 1).is_err());
        assert!(object_path(&["user"], "noext", 1).is_err());
    }

    #[test]
    fn upload_then_delete_by_public_url() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn).with_session(session());
        let storage = StorageService::new(ServiceContext::new(&gateway));

        let stored = storage
            .upload_image("hive-photos", &["u1", "h1"], "front.jpg", b"jpeg-bytes")
            .unwrap();
        assert!(stored.path.starts_with("u1/h1/"));
        let (content_type, bytes) = gateway.object("hive-photos", &stored.path).unwrap().unwrap();
        assert_eq!(content_type, "image/jpeg");
        assert_eq!(bytes, b"jpeg-bytes");

        assert_eq!(
            storage.object_path_from_url("hive-photos", &format!("{}?t=1", stored.public_url)),
            Some(stored.path.clone())
        );
        assert!(storage
            .delete_by_public_url("hive-photos", &stored.public_url)
            .unwrap());
        assert!(gateway.object("hive-photos", &stored.path).unwrap().is_none());
        assert!(!storage
            .delete_by_public_url("avatars", &stored.public_url)
            .unwrap());
    }

    #[test]
    fn upload_rejects_empty_oversized_and_unsupported_files() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn).with_session(session());
        let storage = StorageService::new(ServiceContext::new(&gateway));

        for (name, bytes) in [
            ("a.png", Vec::new()),
            ("a.png", vec![0u8; MAX_IMAGE_BYTES + 1]),
            ("a.gif", vec![1u8]),
        ] {
            assert!(matches!(
                storage.upload_image("avatars", &["u1"], name, &bytes),
                Err(ServiceError::Validation(_))
            ));
        }
    }

    #[test]
    fn upload_requires_session_and_connectivity() {
        let conn = open_db_in_memory().unwrap();
        let gateway = EmbeddedGateway::new(&conn);
        let storage = StorageService::new(ServiceContext::new(&gateway));
        assert!(matches!(
            storage.upload_image("avatars", &["u1"], "a.png", b"x"),
            Err(ServiceError::Unauthenticated)
        ));

        gateway.set_session(Some(session()));
        gateway.set_online(false);
        let err = storage
            .upload_image("avatars", &["u1"], "a.png", b"x")
            .unwrap_err();
        assert!(err.is_offline());
    }
}
