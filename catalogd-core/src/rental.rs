//! Rental due dates, overdue status and late fees.
//!
//! A rental is due `rental_duration` days after it was taken out. It is
//! overdue once the current calendar date is strictly past the due date's
//! calendar date, so a film due at 09:00 today is still outstanding until
//! midnight. The late fee is 1.5x the film's daily rental rate for every
//! whole day overdue.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Multiplier applied to the daily rate for each day overdue
pub const LATE_FEE_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    Returned,
    Outstanding,
    Overdue,
}

impl RentalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Returned => "returned",
            Self::Outstanding => "outstanding",
            Self::Overdue => "overdue",
        }
    }
}

/// `status=` query filter on the rental list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Returned,
    Outstanding,
    Overdue,
}

impl FromStr for StatusFilter {
    type Err = std::convert::Infallible;

    /// Unknown values mean "no filter".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "returned" => Self::Returned,
            "outstanding" => Self::Outstanding,
            "overdue" => Self::Overdue,
            _ => Self::All,
        })
    }
}

impl StatusFilter {
    /// SQL predicate for this filter. `due_date_sql` must evaluate to the
    /// rental's due date; the predicate references `:today`.
    pub fn predicate(&self, return_col: &str, due_date_sql: &str) -> Option<String> {
        match self {
            Self::All => None,
            Self::Returned => Some(format!("{return_col} IS NOT NULL")),
            Self::Outstanding => Some(format!(
                "{return_col} IS NULL AND date(:today) <= {due_date_sql}"
            )),
            Self::Overdue => Some(format!(
                "{return_col} IS NULL AND date(:today) > {due_date_sql}"
            )),
        }
    }
}

pub fn due_date(rental_date: NaiveDateTime, duration_days: i64) -> NaiveDateTime {
    rental_date + Duration::days(duration_days)
}

/// Status and whole days overdue as of `today`.
pub fn rental_status(
    return_date: Option<NaiveDateTime>,
    due: NaiveDateTime,
    today: NaiveDate,
) -> (RentalStatus, i64) {
    if return_date.is_some() {
        return (RentalStatus::Returned, 0);
    }

    let due_day = due.date();
    if today > due_day {
        (RentalStatus::Overdue, (today - due_day).num_days())
    } else {
        (RentalStatus::Outstanding, 0)
    }
}

/// Negative inputs contribute nothing.
pub fn late_fee(days_overdue: i64, daily_rate: f64) -> f64 {
    if days_overdue <= 0 || daily_rate <= 0.0 || !daily_rate.is_finite() {
        return 0.0;
    }
    days_overdue as f64 * daily_rate * LATE_FEE_MULTIPLIER
}

/// Round a monetary amount to cents for storage.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Everything derived for one rental row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RentalSummary {
    pub due_date: NaiveDateTime,
    pub status: RentalStatus,
    pub days_overdue: i64,
    pub late_fee: f64,
}

impl RentalSummary {
    pub fn evaluate(
        rental_date: NaiveDateTime,
        rental_duration: i64,
        daily_rate: f64,
        return_date: Option<NaiveDateTime>,
        today: NaiveDate,
    ) -> Self {
        let due = due_date(rental_date, rental_duration);
        let (status, days_overdue) = rental_status(return_date, due, today);

        Self {
            due_date: due,
            status,
            days_overdue,
            late_fee: late_fee(days_overdue, daily_rate),
        }
    }

    pub fn is_overdue(&self) -> bool {
        self.status == RentalStatus::Overdue
    }
}
