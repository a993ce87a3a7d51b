//! Validation error types

use std::fmt;

/// Rejected request input. Always surfaces as a 400.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field was absent, empty or zero
    MissingField { field: &'static str },

    /// Several required fields were absent at once
    MissingFields { fields: Vec<&'static str> },

    /// A path or query id was not an integer
    InvalidId { resource: &'static str },

    /// A query id was required but absent
    MissingId { resource: &'static str },

    /// A field was present but unusable
    InvalidValue { field: &'static str, reason: String },

    /// An update request carried nothing to change
    NothingToUpdate,
}

impl ValidationError {
    /// Collect every missing field name; `Ok` when the input is complete.
    pub fn require(checks: &[(&'static str, bool)]) -> Result<(), Self> {
        let fields: Vec<&'static str> = checks
            .iter()
            .filter(|(_, present)| !present)
            .map(|(field, _)| *field)
            .collect();

        match fields.len() {
            0 => Ok(()),
            1 => Err(Self::MissingField { field: fields[0] }),
            _ => Err(Self::MissingFields { fields }),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "{} is required", field),
            Self::MissingFields { fields } => {
                write!(f, "Missing required fields: {}", fields.join(", "))
            }
            Self::InvalidId { resource } => write!(f, "Invalid {} ID", resource),
            Self::MissingId { resource } => write!(f, "{} ID is required", resource),
            Self::InvalidValue { field, reason } => write!(f, "{}: {}", field, reason),
            Self::NothingToUpdate => write!(f, "No fields to update"),
        }
    }
}

impl std::error::Error for ValidationError {}
