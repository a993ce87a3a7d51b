/// Structured error types for catalogd-core.
///
/// The server crate wraps these into HTTP responses; the CLI folds them into
/// `anyhow` errors.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Timestamp column or query parameter could not be parsed
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// Configuration file named explicitly but absent
    #[error("Config not found at {path:?}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

/// Result type alias for catalogd-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an invalid timestamp error
    pub fn invalid_timestamp(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_error_names_the_value() {
        let err = CoreError::invalid_timestamp("yesterday", "unrecognized format");
        assert_eq!(
            err.to_string(),
            "Invalid timestamp 'yesterday': unrecognized format"
        );
    }
}
