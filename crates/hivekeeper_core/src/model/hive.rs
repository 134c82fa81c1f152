//! Hive (bee colony) record.
//!
//! # Invariants
//! - `name` is non-empty after trimming and at most `MAX_HIVE_NAME_CHARS`.
//! - `latitude` and `longitude` are either both set or both absent.
//! - `status` only leaves `Active` through a recorded transaction.

use super::validation::require_text;
use super::{normalize_optional_text, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type HiveId = Uuid;

pub const MAX_HIVE_NAME_CHARS: usize = 80;

/// Lifecycle state of a hive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiveStatus {
    Active,
    Sold,
    Donated,
    Lost,
}

impl HiveStatus {
    pub const ALL: [HiveStatus; 4] = [Self::Active, Self::Sold, Self::Donated, Self::Lost];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Sold => "sold",
            Self::Donated => "donated",
            Self::Lost => "lost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

/// How the colony was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiveOrigin {
    Purchase,
    Capture,
    Division,
    Donation,
    Transfer,
}

impl HiveOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Capture => "capture",
            Self::Division => "division",
            Self::Donation => "donation",
            Self::Transfer => "transfer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "purchase" => Some(Self::Purchase),
            "capture" => Some(Self::Capture),
            "division" => Some(Self::Division),
            "donation" => Some(Self::Donation),
            "transfer" => Some(Self::Transfer),
            _ => None,
        }
    }
}

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::OutOfRange {
                field: "latitude",
                expected: "-90..=90",
            });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::OutOfRange {
                field: "longitude",
                expected: "-180..=180",
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// A tracked bee colony.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hive {
    pub id: HiveId,
    pub user_id: UserId,
    pub name: String,
    /// Catalog id of the bee species.
    pub species: String,
    pub origin: HiveOrigin,
    /// Catalog id of the box model, when known.
    pub box_type: Option<String>,
    pub status: HiveStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Public URL of the uploaded hive photo.
    pub photo_url: Option<String>,
    pub notes: Option<String>,
    pub acquired_at: i64,
    pub created_at: i64,
}

/// Input for creating a hive.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewHive {
    pub name: String,
    pub species: String,
    pub origin: Option<HiveOrigin>,
    pub box_type: Option<String>,
    pub location: Option<GeoPoint>,
    pub notes: Option<String>,
    /// Defaults to the creation time when absent.
    pub acquired_at: Option<i64>,
}

impl Hive {
    /// Builds an active hive owned by `user_id` with a fresh id.
    pub fn from_new(user_id: UserId, input: NewHive, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: input.name.trim().to_string(),
            species: input.species.trim().to_string(),
            origin: input.origin.unwrap_or(HiveOrigin::Purchase),
            box_type: normalize_optional_text(input.box_type),
            status: HiveStatus::Active,
            latitude: input.location.map(|point| point.latitude),
            longitude: input.location.map(|point| point.longitude),
            photo_url: None,
            notes: normalize_optional_text(input.notes),
            acquired_at: input.acquired_at.unwrap_or(now_ms),
            created_at: now_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name, MAX_HIVE_NAME_CHARS)?;
        require_text("species", &self.species, MAX_HIVE_NAME_CHARS)?;
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                GeoPoint::new(latitude, longitude)?;
            }
            (None, None) => {}
            _ => {
                return Err(ValidationError::Inconsistent(
                    "latitude and longitude must be set together",
                ))
            }
        }
        Ok(())
    }

    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
