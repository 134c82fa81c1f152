//! Runtime configuration resolved from environment variables.
//!
//! # Invariants
//! - Values are trimmed; blank values count as unset.
//! - A backend URL without an anon key is rejected.
//! - Without a backend URL the core runs in local-only mode.

use crate::logging::default_log_level;
use crate::model::UserId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use uuid::Uuid;

pub const ENV_DB_PATH: &str = "HIVEKEEPER_DB_PATH";
pub const ENV_BACKEND_URL: &str = "HIVEKEEPER_BACKEND_URL";
pub const ENV_ANON_KEY: &str = "HIVEKEEPER_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "HIVEKEEPER_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "HIVEKEEPER_USER_ID";
pub const ENV_LOG_LEVEL: &str = "HIVEKEEPER_LOG_LEVEL";

const DEFAULT_DB_FILE_NAME: &str = "hivekeeper.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingValue(&'static str),
    InvalidValue { key: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingValue(key) => write!(f, "missing required setting {key}"),
            Self::InvalidValue { key, message } => write!(f, "invalid {key}: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Hosted backend coordinates and optional pre-provisioned session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub backend: Option<BackendConfig>,
    pub log_level: String,
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through `lookup`, which maps a key to its raw
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key).and_then(|raw| {
                let trimmed = raw.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
        };

        let db_path = read(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DB_FILE_NAME));

        let backend = match read(ENV_BACKEND_URL) {
            Some(url) => {
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_BACKEND_URL,
                        message: "expected an http(s) URL".to_string(),
                    });
                }
                let anon_key = read(ENV_ANON_KEY).ok_or(ConfigError::MissingValue(ENV_ANON_KEY))?;
                let user_id = match read(ENV_USER_ID) {
                    Some(raw) => Some(Uuid::parse_str(&raw).map_err(|err| {
                        ConfigError::InvalidValue {
                            key: ENV_USER_ID,
                            message: err.to_string(),
                        }
                    })?),
                    None => None,
                };
                Some(BackendConfig {
                    url,
                    anon_key,
                    access_token: read(ENV_ACCESS_TOKEN),
                    user_id,
                })
            }
            None => None,
        };

        Ok(Self {
            db_path,
            backend,
            log_level: read(ENV_LOG_LEVEL).unwrap_or_else(|| default_log_level().to_string()),
        })
    }

    pub fn is_local_only(&self) -> bool {
        self.backend.is_none()
    }
}
