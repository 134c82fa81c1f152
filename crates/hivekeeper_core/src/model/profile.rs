//! Beekeeper profile, one per authenticated user.

use super::validation::require_text;
use super::{normalize_optional_text, UserId, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_PROFILE_TEXT_CHARS: usize = 120;

static PHONE_NOISE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s().\-]+").expect("valid phone noise regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]{8,15}$").expect("valid phone regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Same as the owning user id.
    pub id: UserId,
    pub full_name: Option<String>,
    pub apiary_name: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub updated_at: i64,
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub apiary_name: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub phone: Option<String>,
}

impl Profile {
    pub fn empty(id: UserId, now_ms: i64) -> Self {
        Self {
            id,
            full_name: None,
            apiary_name: None,
            city: None,
            region: None,
            phone: None,
            avatar_url: None,
            updated_at: now_ms,
        }
    }

    /// Applies `update`; blank strings clear the field.
    pub fn apply(&mut self, update: ProfileUpdate, now_ms: i64) -> Result<(), ValidationError> {
        if let Some(full_name) = update.full_name {
            self.full_name = normalize_optional_text(Some(full_name));
        }
        if let Some(apiary_name) = update.apiary_name {
            self.apiary_name = normalize_optional_text(Some(apiary_name));
        }
        if let Some(city) = update.city {
            self.city = normalize_optional_text(Some(city));
        }
        if let Some(region) = update.region {
            self.region = normalize_optional_text(Some(region));
        }
        if let Some(phone) = update.phone {
            self.phone = match normalize_optional_text(Some(phone)) {
                Some(raw) => Some(normalize_phone(&raw)?),
                None => None,
            };
        }
        self.updated_at = now_ms;
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("full_name", &self.full_name),
            ("apiary_name", &self.apiary_name),
            ("city", &self.city),
            ("region", &self.region),
        ] {
            if let Some(text) = value {
                require_text(field, text, MAX_PROFILE_TEXT_CHARS)?;
            }
        }
        Ok(())
    }

    /// Name shown in greetings: full name, then apiary name.
    pub fn display_name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .or(self.apiary_name.as_deref())
    }
}

/// Strips separators and validates an 8 to 15 digit number with optional `+`.
pub fn normalize_phone(raw: &str) -> Result<String, ValidationError> {
    let compact = PHONE_NOISE_RE.replace_all(raw.trim(), "").to_string();
    if !PHONE_RE.is_match(&compact) {
        return Err(ValidationError::OutOfRange {
            field: "phone",
            expected: "8 to 15 digits with optional leading +",
        });
    }
    Ok(compact)
}
