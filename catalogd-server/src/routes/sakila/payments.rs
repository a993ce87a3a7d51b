//! Payments: listing, manual entry, detail and revenue statistics.
//!
//! Every payment is classified on its own date against its rental: taken
//! on the rental day it is `rental`; taken on the return day of a rental
//! that came back after its due date it is `late_fee`; anything else,
//! including payments with no rental, is `other`.

use axum::extract::{Path, Query, State};
use axum::Json;
use catalogd_core::{
    format_timestamp, OrderBy, Pagination, Params, SortDirection, ValidationError, WhereClause,
};
use serde::{Deserialize, Serialize};

use crate::db::{Record, SqlExecutor};
use crate::error::{ApiError, ApiResult, DbContext};
use crate::ids::parse_id;
use crate::params;
use crate::state::AppState;

const PAYMENT_SELECT: &str = r#"
    SELECT p.payment_id, p.customer_id, p.staff_id, p.rental_id, p.amount,
           p.payment_date, p.last_update,
           c.first_name || ' ' || c.last_name AS customer_name,
           c.email AS customer_email,
           s.first_name || ' ' || s.last_name AS staff_name,
           f.title AS film_title,
           r.rental_date, r.return_date,
           CASE
             WHEN r.rental_id IS NULL THEN 'other'
             WHEN date(p.payment_date) = date(r.rental_date) THEN 'rental'
             WHEN r.return_date IS NOT NULL
                  AND date(p.payment_date) = date(r.return_date)
                  AND date(r.return_date) > date(r.rental_date, '+' || f.rental_duration || ' days')
               THEN 'late_fee'
             ELSE 'other'
           END AS payment_type
    FROM payment p
    JOIN customer c ON p.customer_id = c.customer_id
    JOIN staff s ON p.staff_id = s.staff_id
    LEFT JOIN rental r ON p.rental_id = r.rental_id
    LEFT JOIN inventory i ON r.inventory_id = i.inventory_id
    LEFT JOIN film f ON i.film_id = f.film_id
"#;

const SORT_COLUMNS: &[(&str, &str)] = &[
    ("payment_id", "pd.payment_id"),
    ("customer_name", "pd.customer_name"),
    ("staff_name", "pd.staff_name"),
    ("film_title", "pd.film_title"),
    ("amount", "pd.amount"),
    ("payment_date", "pd.payment_date"),
    ("payment_type", "pd.payment_type"),
];

/// Classified payments as a derived table named `pd`, so filters and
/// sorting can use `payment_type` like any other column.
fn classified(filter: &WhereClause) -> String {
    format!("SELECT pd.* FROM ({PAYMENT_SELECT}) pd{}", filter.to_sql())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentType {
    Rental,
    LateFee,
    Other,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rental => "rental",
            Self::LateFee => "late_fee",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rental" => Ok(Self::Rental),
            "late_fee" => Ok(Self::LateFee),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown payment type: {other}")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuery {
    #[serde(default, deserialize_with = "params::opt")]
    pub customer_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub staff_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub rental_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub payment_type: Option<PaymentType>,
    #[serde(default, deserialize_with = "params::opt")]
    pub min_amount: Option<f64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub max_amount: Option<f64>,
    #[serde(default, deserialize_with = "params::text")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "params::text")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "params::text")]
    pub sort_by: Option<String>,
    #[serde(default, deserialize_with = "params::text")]
    pub sort_direction: Option<String>,
    #[serde(default, deserialize_with = "params::opt")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "params::opt")]
    pub limit: Option<u32>,
}

impl PaymentQuery {
    fn filter(&self) -> WhereClause {
        let mut filter = WhereClause::new();
        filter
            .push_opt("pd.customer_id = :customerId", ":customerId", self.customer_id)
            .push_opt("pd.staff_id = :staffId", ":staffId", self.staff_id)
            .push_opt("pd.rental_id = :rentalId", ":rentalId", self.rental_id)
            .push_opt(
                "pd.payment_type = :paymentType",
                ":paymentType",
                self.payment_type.map(|t| t.as_str()),
            )
            .push_opt("pd.amount >= :minAmount", ":minAmount", self.min_amount)
            .push_opt("pd.amount <= :maxAmount", ":maxAmount", self.max_amount)
            .push_opt(
                "date(pd.payment_date) >= date(:startDate)",
                ":startDate",
                self.start_date.clone(),
            )
            .push_opt(
                "date(pd.payment_date) <= date(:endDate)",
                ":endDate",
                self.end_date.clone(),
            );
        filter
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentPagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct PaymentList {
    pub data: Vec<Record>,
    pub pagination: PaymentPagination,
}

/// GET /payments
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentQuery>,
) -> ApiResult<Json<PaymentList>> {
    let filter = query.filter();
    let order = OrderBy::resolve(
        query.sort_by.as_deref(),
        SORT_COLUMNS,
        "pd.payment_date",
        SortDirection::parse(query.sort_direction.as_deref(), SortDirection::Desc),
    );
    let sql = format!("{}{}, pd.payment_id DESC", classified(&filter), order.to_sql());
    let pagination = Pagination::from_query(query.page, query.limit, 10);

    state
        .db
        .call(move |session| -> ApiResult<Json<PaymentList>> {
            let page = session
                .paginate(&sql, filter.params(), pagination)
                .context("Failed to load payments")?;

            Ok(Json(PaymentList {
                pagination: PaymentPagination {
                    total: page.total,
                    page: page.page,
                    limit: page.page_size,
                    pages: page.total_pages(),
                },
                data: page.items,
            }))
        })
        .await
}

fn load_payment<E: SqlExecutor>(db: &E, payment_id: i64) -> ApiResult<Option<Record>> {
    db.get(
        &format!("{PAYMENT_SELECT} WHERE p.payment_id = :paymentId"),
        &Params::new().bind(":paymentId", payment_id),
    )
    .context("Failed to load payment")
}

/// GET /payments/{id}
pub async fn get_payment(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Record>> {
    let payment_id = parse_id(&raw_id, "payment")?;

    state
        .db
        .call(move |session| -> ApiResult<Json<Record>> {
            load_payment(session, payment_id)?
                .map(Json)
                .ok_or_else(|| ApiError::not_found("Payment not found"))
        })
        .await
}

#[derive(Debug, Default, Deserialize)]
pub struct NewPayment {
    pub customer_id: Option<i64>,
    pub staff_id: Option<i64>,
    pub rental_id: Option<i64>,
    pub amount: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PaymentCreated {
    pub message: &'static str,
    pub payment: Option<Record>,
}

/// POST /payments
pub async fn create_payment(
    State(state): State<AppState>,
    Json(data): Json<NewPayment>,
) -> ApiResult<Json<PaymentCreated>> {
    ValidationError::require(&[
        ("customer_id", data.customer_id.is_some_and(|id| id != 0)),
        ("staff_id", data.staff_id.is_some_and(|id| id != 0)),
        ("amount", data.amount.is_some_and(|a| a != 0.0)),
    ])?;
    if data.amount.is_some_and(|a| a < 0.0) {
        return Err(ValidationError::InvalidValue {
            field: "amount",
            reason: "must be positive".into(),
        }
        .into());
    }

    let now = format_timestamp(state.clock.now());

    state
        .db
        .call(move |session| -> ApiResult<Json<PaymentCreated>> {
            let payment_id = session
                .insert(
                    "payment",
                    &[
                        ("customer_id", data.customer_id.into()),
                        ("staff_id", data.staff_id.into()),
                        ("rental_id", data.rental_id.filter(|id| *id != 0).into()),
                        ("amount", data.amount.into()),
                        ("payment_date", now.as_str().into()),
                        ("last_update", now.as_str().into()),
                    ],
                )
                .context("Failed to create payment")?;

            tracing::info!(payment_id, customer_id = ?data.customer_id, "payment recorded");

            Ok(Json(PaymentCreated {
                message: "Payment created",
                payment: load_payment(session, payment_id)?,
            }))
        })
        .await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    #[serde(default, deserialize_with = "params::text")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "params::text")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "params::opt")]
    pub customer_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub staff_id: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PaymentTotals {
    pub total_payments: i64,
    pub total_amount: f64,
    pub rental_payments: i64,
    pub rental_amount: f64,
    pub late_fee_payments: i64,
    pub late_fee_amount: f64,
    pub other_payments: i64,
    pub other_amount: f64,
}

#[derive(Debug, Serialize)]
pub struct PaymentStats {
    #[serde(flatten)]
    pub totals: PaymentTotals,
    pub daily_stats: Vec<Record>,
    pub monthly_stats: Vec<Record>,
}

/// GET /payments/stats
pub async fn payment_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<PaymentStats>> {
    let list = PaymentQuery {
        customer_id: query.customer_id,
        staff_id: query.staff_id,
        start_date: query.start_date,
        end_date: query.end_date,
        ..Default::default()
    };
    let filter = list.filter();
    let source = classified(&filter);

    state
        .db
        .call(move |session| -> ApiResult<Json<PaymentStats>> {
            let params = filter.params();
            let totals = session
                .get_as::<PaymentTotals>(
                    &format!(
                        r#"
                        SELECT COUNT(*) AS total_payments,
                               COALESCE(SUM(amount), 0.0) AS total_amount,
                               COALESCE(SUM(payment_type = 'rental'), 0) AS rental_payments,
                               COALESCE(SUM(CASE WHEN payment_type = 'rental' THEN amount END), 0.0) AS rental_amount,
                               COALESCE(SUM(payment_type = 'late_fee'), 0) AS late_fee_payments,
                               COALESCE(SUM(CASE WHEN payment_type = 'late_fee' THEN amount END), 0.0) AS late_fee_amount,
                               COALESCE(SUM(payment_type = 'other'), 0) AS other_payments,
                               COALESCE(SUM(CASE WHEN payment_type = 'other' THEN amount END), 0.0) AS other_amount
                        FROM ({source})
                        "#
                    ),
                    params,
                )
                .context("Failed to total payments")?
                .unwrap_or_default();

            let daily_stats = session
                .query(
                    &format!(
                        r#"
                        SELECT date(payment_date) AS date, COUNT(*) AS count, SUM(amount) AS amount
                        FROM ({source})
                        GROUP BY date(payment_date)
                        ORDER BY date(payment_date) DESC
                        LIMIT 30
                        "#
                    ),
                    params,
                )
                .context("Failed to load daily payment stats")?;

            let monthly_stats = session
                .query(
                    &format!(
                        r#"
                        SELECT strftime('%Y-%m', payment_date) AS year_month, COUNT(*) AS count, SUM(amount) AS amount
                        FROM ({source})
                        GROUP BY strftime('%Y-%m', payment_date)
                        ORDER BY year_month DESC
                        LIMIT 12
                        "#
                    ),
                    params,
                )
                .context("Failed to load monthly payment stats")?;

            Ok(Json(PaymentStats {
                totals,
                daily_stats,
                monthly_stats,
            }))
        })
        .await
}
