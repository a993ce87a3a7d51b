//! Path id parsing.

use catalogd_core::ValidationError;

/// Parse a path or query segment as a numeric id.
pub fn parse_id(raw: &str, resource: &'static str) -> Result<i64, ValidationError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidId { resource })
}

/// `?id=` on catalog PUT/DELETE: absent is "required", garbage is "invalid".
pub fn require_query_id(raw: Option<&str>, resource: &'static str) -> Result<i64, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_id(raw, resource),
        None => Err(ValidationError::MissingId { resource }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_ids() {
        assert_eq!(parse_id("42", "film"), Ok(42));
        assert_eq!(parse_id(" 7 ", "film"), Ok(7));
    }

    #[test]
    fn rejects_non_numeric_ids() {
        assert_eq!(
            parse_id("abc", "film"),
            Err(ValidationError::InvalidId { resource: "film" })
        );
    }

    #[test]
    fn query_id_must_be_present() {
        let err = require_query_id(None, "Artist").unwrap_err();
        assert_eq!(err.to_string(), "Artist ID is required");
        assert_eq!(require_query_id(Some("3"), "Artist"), Ok(3));
    }
}
