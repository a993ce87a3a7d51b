//! Timestamp handling for the `TEXT` date columns.
//!
//! The rental database stores `YYYY-MM-DD HH:MM:SS`; rows written by other
//! tools sometimes carry ISO-8601 with a `T` separator and a `Z` suffix.
//! Both are accepted on read, the former is always written.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{CoreError, Result};

/// Column format used for every timestamp this crate writes.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date-only format, also what `:today` is bound as in SQL.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a stored timestamp. Offsets are normalised to UTC.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc).naive_utc());
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(date.and_time(chrono::NaiveTime::MIN));
    }

    Err(CoreError::invalid_timestamp(
        value,
        "expected YYYY-MM-DD HH:MM:SS or ISO-8601",
    ))
}

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

/// Source of "now". Handlers never read the system clock directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    Fixed(NaiveDateTime),
}

impl Clock {
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Self::System => Utc::now().naive_utc(),
            Self::Fixed(at) => *at,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// `today` in the form bound to `:today` parameters.
    pub fn today_param(&self) -> String {
        format_date(self.today())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn parses_column_format() {
        assert_eq!(
            parse_timestamp("2005-05-24 22:53:30").unwrap(),
            at("2005-05-24 22:53:30")
        );
    }

    #[test]
    fn parses_iso_with_zulu_and_fraction() {
        assert_eq!(
            parse_timestamp("2024-06-15T08:30:00.000Z").unwrap(),
            at("2024-06-15 08:30:00")
        );
        assert_eq!(
            parse_timestamp("2024-06-15T10:30:00+02:00").unwrap(),
            at("2024-06-15 08:30:00")
        );
    }

    #[test]
    fn parses_bare_date_as_midnight() {
        assert_eq!(
            parse_timestamp("2024-06-15").unwrap(),
            at("2024-06-15 00:00:00")
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_timestamp("last tuesday"),
            Err(CoreError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn fixed_clock_is_stable() {
        let clock = Clock::Fixed(at("2024-06-15 12:00:00"));
        assert_eq!(clock.today_param(), "2024-06-15");
        assert_eq!(format_timestamp(clock.now()), "2024-06-15 12:00:00");
    }
}
