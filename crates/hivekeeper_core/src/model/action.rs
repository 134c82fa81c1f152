//! Management actions recorded against a hive.
//!
//! An `Action` row carries the common fields; the kind-specific payload lives
//! in one detail table per kind, keyed by `action_id`.
//!
//! # Invariants
//! - `ActionDetail::kind()` always equals the parent `Action::kind`.
//! - Detail rows are deleted before their parent action.

use super::hive::HiveId;
use super::validation::{require_non_negative, require_text};
use super::{normalize_optional_text, UserId, ValidationError};
use crate::gateway::tables;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ActionId = Uuid;

const MAX_DETAIL_TEXT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Feeding,
    Harvest,
    Inspection,
    Maintenance,
    Transfer,
    Division,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        Self::Feeding,
        Self::Harvest,
        Self::Inspection,
        Self::Maintenance,
        Self::Transfer,
        Self::Division,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feeding => "feeding",
            Self::Harvest => "harvest",
            Self::Inspection => "inspection",
            Self::Maintenance => "maintenance",
            Self::Transfer => "transfer",
            Self::Division => "division",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value.trim())
    }

    /// Remote table holding the detail rows of this kind.
    pub fn detail_table(self) -> &'static str {
        match self {
            Self::Feeding => tables::FEEDING_DETAILS,
            Self::Harvest => tables::HARVEST_DETAILS,
            Self::Inspection => tables::INSPECTION_DETAILS,
            Self::Maintenance => tables::MAINTENANCE_DETAILS,
            Self::Transfer => tables::TRANSFER_DETAILS,
            Self::Division => tables::DIVISION_DETAILS,
        }
    }
}

/// Common part of a management event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub hive_id: HiveId,
    pub user_id: UserId,
    pub kind: ActionKind,
    pub performed_at: i64,
    pub notes: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroodCondition {
    Absent,
    Weak,
    Normal,
    Strong,
}

/// Kind-specific payload of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionDetail {
    Feeding {
        food_type: String,
        quantity_ml: f64,
    },
    Harvest {
        honey_ml: f64,
        wax_g: Option<f64>,
        pollen_g: Option<f64>,
    },
    Inspection {
        queen_seen: bool,
        brood: BroodCondition,
        /// Colony strength on a 1 (weak) to 5 (strong) scale.
        strength: u8,
        pests: Option<String>,
    },
    Maintenance {
        description: String,
        materials: Option<String>,
    },
    Transfer {
        from_box: String,
        to_box: String,
    },
    Division {
        /// Filled in by the service once the new hive exists.
        new_hive_id: Option<HiveId>,
        new_hive_name: String,
    },
}

impl ActionDetail {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Feeding { .. } => ActionKind::Feeding,
            Self::Harvest { .. } => ActionKind::Harvest,
            Self::Inspection { .. } => ActionKind::Inspection,
            Self::Maintenance { .. } => ActionKind::Maintenance,
            Self::Transfer { .. } => ActionKind::Transfer,
            Self::Division { .. } => ActionKind::Division,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Feeding {
                food_type,
                quantity_ml,
            } => {
                require_text("food_type", food_type, MAX_DETAIL_TEXT_CHARS)?;
                require_non_negative("quantity_ml", *quantity_ml)
            }
            Self::Harvest {
                honey_ml,
                wax_g,
                pollen_g,
            } => {
                require_non_negative("honey_ml", *honey_ml)?;
                if let Some(wax) = wax_g {
                    require_non_negative("wax_g", *wax)?;
                }
                if let Some(pollen) = pollen_g {
                    require_non_negative("pollen_g", *pollen)?;
                }
                Ok(())
            }
            Self::Inspection { strength, .. } => {
                if !(1..=5).contains(strength) {
                    return Err(ValidationError::OutOfRange {
                        field: "strength",
                        expected: "1..=5",
                    });
                }
                Ok(())
            }
            Self::Maintenance { description, .. } => {
                require_text("description", description, MAX_DETAIL_TEXT_CHARS)
            }
            Self::Transfer { from_box, to_box } => {
                require_text("from_box", from_box, MAX_DETAIL_TEXT_CHARS)?;
                require_text("to_box", to_box, MAX_DETAIL_TEXT_CHARS)?;
                if from_box.trim() == to_box.trim() {
                    return Err(ValidationError::Inconsistent(
                        "transfer must move the colony to a different box",
                    ));
                }
                Ok(())
            }
            Self::Division { new_hive_name, .. } => {
                require_text("new_hive_name", new_hive_name, super::hive::MAX_HIVE_NAME_CHARS)
            }
        }
    }

    /// Short human summary used by timeline rows.
    pub fn summary(&self) -> String {
        match self {
            Self::Feeding {
                food_type,
                quantity_ml,
            } => format!("{quantity_ml} ml of {food_type}"),
            Self::Harvest { honey_ml, .. } => format!("{honey_ml} ml of honey"),
            Self::Inspection {
                queen_seen,
                strength,
                ..
            } => format!(
                "strength {strength}/5, queen {}",
                if *queen_seen { "seen" } else { "not seen" }
            ),
            Self::Maintenance { description, .. } => description.clone(),
            Self::Transfer { from_box, to_box } => format!("{from_box} -> {to_box}"),
            Self::Division { new_hive_name, .. } => format!("split into {new_hive_name}"),
        }
    }

    pub fn honey_ml(&self) -> Option<f64> {
        match self {
            Self::Harvest { honey_ml, .. } => Some(*honey_ml),
            _ => None,
        }
    }
}

/// Detail as persisted: the payload plus its owning action and hive.
///
/// `hive_id` duplicates the parent action's hive so detail rows can be
/// filtered by hive directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDetailRecord {
    pub id: Uuid,
    pub action_id: ActionId,
    pub hive_id: HiveId,
    #[serde(flatten)]
    pub detail: ActionDetail,
}

impl ActionDetailRecord {
    pub fn new(action_id: ActionId, hive_id: HiveId, detail: ActionDetail) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_id,
            hive_id,
            detail,
        }
    }
}

/// Input for recording an action.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    pub hive_id: HiveId,
    /// Defaults to the recording time when absent.
    pub performed_at: Option<i64>,
    pub notes: Option<String>,
    pub detail: ActionDetail,
}

impl Action {
    pub fn from_new(user_id: UserId, input: &NewAction, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            hive_id: input.hive_id,
            user_id,
            kind: input.detail.kind(),
            performed_at: input.performed_at.unwrap_or(now_ms),
            notes: normalize_optional_text(input.notes.clone()),
            created_at: now_ms,
        }
    }
}

/// Action hydrated with its detail (absent when the detail row is missing).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub action: Action,
    pub detail: Option<ActionDetail>,
}
