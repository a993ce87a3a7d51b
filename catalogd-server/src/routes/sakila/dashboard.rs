use axum::extract::{Query, State};
use axum::Json;
use catalogd_core::{format_date, Params};
use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::db::{Record, SqlExecutor};
use crate::error::{ApiResult, DbContext};
use crate::params;
use crate::state::AppState;

/// Window for the "top categories" panel, counted back from today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl std::str::FromStr for Period {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "day" => Self::Day,
            "week" => Self::Week,
            "year" => Self::Year,
            _ => Self::Month,
        })
    }
}

impl Period {
    /// First day inside the window.
    pub fn since(&self, today: NaiveDate) -> NaiveDate {
        let start = match self {
            Self::Day => today.checked_sub_days(Days::new(1)),
            Self::Week => today.checked_sub_days(Days::new(7)),
            Self::Month => today.checked_sub_days(Days::new(30)),
            Self::Year => today.checked_sub_months(Months::new(12)),
        };
        start.unwrap_or(NaiveDate::MIN)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    #[serde(default, deserialize_with = "params::opt")]
    pub period: Option<Period>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Totals {
    pub total_films: i64,
    pub total_rentals: i64,
    pub total_customers: i64,
    pub total_revenue: f64,
    pub active_rentals: i64,
    pub overdue_rentals: i64,
    pub inventory_available: i64,
    pub inventory_rented: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    #[serde(flatten)]
    pub totals: Totals,
    pub top_categories: Vec<Record>,
    pub revenue_by_month: Vec<Record>,
    pub recent_rentals: Vec<Record>,
}

/// GET /dashboard/stats
pub async fn dashboard_stats(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<DashboardStats>> {
    let today = state.clock.today();
    let since = query.period.unwrap_or_default().since(today);
    let revenue_since = today
        .checked_sub_months(Months::new(12))
        .unwrap_or(NaiveDate::MIN);

    let params = Params::new()
        .bind(":today", format_date(today))
        .bind(":since", format_date(since))
        .bind(":revenueSince", format_date(revenue_since));

    state
        .db
        .call(move |session| -> ApiResult<Json<DashboardStats>> {
            let totals = session
                .get_as::<Totals>(
                    r#"
                    SELECT
                      (SELECT COUNT(*) FROM film) AS total_films,
                      (SELECT COUNT(*) FROM rental) AS total_rentals,
                      (SELECT COUNT(*) FROM customer) AS total_customers,
                      (SELECT COALESCE(SUM(amount), 0.0) FROM payment) AS total_revenue,
                      (SELECT COUNT(*) FROM rental WHERE return_date IS NULL) AS active_rentals,
                      (SELECT COUNT(*)
                         FROM rental r
                         JOIN inventory i ON r.inventory_id = i.inventory_id
                         JOIN film f ON i.film_id = f.film_id
                        WHERE r.return_date IS NULL
                          AND date(:today) > date(r.rental_date, '+' || f.rental_duration || ' days')
                      ) AS overdue_rentals,
                      (SELECT COUNT(*) FROM inventory i
                        WHERE NOT EXISTS (SELECT 1 FROM rental r
                                           WHERE r.inventory_id = i.inventory_id AND r.return_date IS NULL)
                      ) AS inventory_available,
                      (SELECT COUNT(*) FROM inventory i
                        WHERE EXISTS (SELECT 1 FROM rental r
                                       WHERE r.inventory_id = i.inventory_id AND r.return_date IS NULL)
                      ) AS inventory_rented
                    "#,
                    &params,
                )
                .context("Failed to load dashboard totals")?
                .unwrap_or_default();

            let top_categories = session
                .query(
                    r#"
                    SELECT c.name, COUNT(*) AS rental_count
                    FROM rental r
                    JOIN inventory i ON r.inventory_id = i.inventory_id
                    JOIN film_category fc ON i.film_id = fc.film_id
                    JOIN category c ON fc.category_id = c.category_id
                    WHERE date(r.rental_date) >= date(:since)
                    GROUP BY c.name
                    ORDER BY rental_count DESC, c.name
                    LIMIT 5
                    "#,
                    &params,
                )
                .context("Failed to load top categories")?;

            let revenue_by_month = session
                .query(
                    r#"
                    SELECT strftime('%Y-%m', payment_date) AS month, SUM(amount) AS amount
                    FROM payment
                    WHERE date(payment_date) >= date(:revenueSince)
                    GROUP BY month
                    ORDER BY month DESC
                    LIMIT 12
                    "#,
                    &params,
                )
                .context("Failed to load monthly revenue")?;

            let recent_rentals = session
                .query(
                    r#"
                    SELECT r.rental_id, r.rental_date,
                           c.first_name || ' ' || c.last_name AS customer_name,
                           f.title AS film_title, r.return_date
                    FROM rental r
                    JOIN customer c ON r.customer_id = c.customer_id
                    JOIN inventory i ON r.inventory_id = i.inventory_id
                    JOIN film f ON i.film_id = f.film_id
                    ORDER BY r.rental_date DESC
                    LIMIT 10
                    "#,
                    &params,
                )
                .context("Failed to load recent rentals")?;

            Ok(Json(DashboardStats {
                totals,
                top_categories,
                revenue_by_month,
                recent_rentals,
            }))
        })
        .await
}
