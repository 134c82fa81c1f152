use std::error::Error;
use std::fmt::{Display, Formatter};

/// Rule violation found while validating a domain record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required text field is empty after trimming.
    Blank(&'static str),
    /// Text field exceeds its maximum length in characters.
    TooLong { field: &'static str, max: usize },
    /// Numeric field is outside its accepted range.
    OutOfRange {
        field: &'static str,
        expected: &'static str,
    },
    /// Required field is missing for this record variant.
    Missing(&'static str),
    /// Fields are individually valid but contradict each other.
    Inconsistent(&'static str),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank(field) => write!(f, "{field} must not be empty"),
            Self::TooLong { field, max } => {
                write!(f, "{field} must be at most {max} characters")
            }
            Self::OutOfRange { field, expected } => {
                write!(f, "{field} is out of range (expected {expected})")
            }
            Self::Missing(field) => write!(f, "{field} is required"),
            Self::Inconsistent(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Blank(field));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub(crate) fn require_non_negative(
    field: &'static str,
    value: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::OutOfRange {
            field,
            expected: "a finite value >= 0",
        });
    }
    Ok(())
}
