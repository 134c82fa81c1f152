//! Disposal transactions (sale, donation, loss).
//!
//! Recording a transaction moves the hive out of `Active`; the resulting
//! status is derived from the transaction kind.

use super::hive::{HiveId, HiveStatus};
use super::validation::{require_non_negative, require_text};
use super::{normalize_optional_text, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TransactionId = Uuid;

const MAX_TRANSACTION_TEXT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Donation,
    Loss,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 3] = [Self::Sale, Self::Donation, Self::Loss];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Donation => "donation",
            Self::Loss => "loss",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value.trim())
    }

    /// Hive status after a transaction of this kind.
    pub fn resulting_status(self) -> HiveStatus {
        match self {
            Self::Sale => HiveStatus::Sold,
            Self::Donation => HiveStatus::Donated,
            Self::Loss => HiveStatus::Lost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub hive_id: HiveId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub occurred_at: i64,
    /// Sale price; required for sales.
    pub amount: Option<f64>,
    /// Buyer or recipient.
    pub counterparty: Option<String>,
    /// Cause of loss; required for losses.
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: i64,
}

/// Input for recording a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub hive_id: HiveId,
    pub kind: TransactionKind,
    pub occurred_at: Option<i64>,
    pub amount: Option<f64>,
    pub counterparty: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl Transaction {
    pub fn from_new(user_id: UserId, input: NewTransaction, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            hive_id: input.hive_id,
            user_id,
            kind: input.kind,
            occurred_at: input.occurred_at.unwrap_or(now_ms),
            amount: input.amount,
            counterparty: normalize_optional_text(input.counterparty),
            reason: normalize_optional_text(input.reason),
            notes: normalize_optional_text(input.notes),
            created_at: now_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(amount) = self.amount {
            require_non_negative("amount", amount)?;
        }
        if let Some(counterparty) = &self.counterparty {
            require_text("counterparty", counterparty, MAX_TRANSACTION_TEXT_CHARS)?;
        }
        match self.kind {
            TransactionKind::Sale if self.amount.is_none() => {
                Err(ValidationError::Missing("amount"))
            }
            TransactionKind::Loss => match &self.reason {
                Some(reason) => require_text("reason", reason, MAX_TRANSACTION_TEXT_CHARS),
                None => Err(ValidationError::Missing("reason")),
            },
            _ => Ok(()),
        }
    }

    pub fn summary(&self) -> String {
        match self.kind {
            TransactionKind::Sale => match (&self.counterparty, self.amount) {
                (Some(buyer), Some(amount)) => format!("sold to {buyer} for {amount:.2}"),
                (None, Some(amount)) => format!("sold for {amount:.2}"),
                _ => "sold".to_string(),
            },
            TransactionKind::Donation => match &self.counterparty {
                Some(recipient) => format!("donated to {recipient}"),
                None => "donated".to_string(),
            },
            TransactionKind::Loss => match &self.reason {
                Some(reason) => format!("lost: {reason}"),
                None => "lost".to_string(),
            },
        }
    }
}
