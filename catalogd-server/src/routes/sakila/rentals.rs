//! Rentals: listing with overdue status, checkout and return.
//!
//! Due dates, overdue days and late fees are computed in Rust from the
//! stored rental date and the film's duration and rate. The equivalent SQL
//! expressions exist only so the list can be filtered and sorted by them;
//! both compare against the `:today` parameter bound from the state clock.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use catalogd_core::rental::{round_cents, RentalSummary, StatusFilter};
use catalogd_core::{
    format_timestamp, parse_timestamp, OrderBy, Pagination, Params, SortDirection, SqlValue,
    ValidationError, WhereClause,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PageBody;
use crate::db::{Record, SqlExecutor};
use crate::error::{ApiError, ApiResult, DbContext};
use crate::ids::parse_id;
use crate::params;
use crate::state::AppState;

const DUE_DATE_SQL: &str = "date(r.rental_date, '+' || f.rental_duration || ' days')";

const SORT_COLUMNS: &[(&str, &str)] = &[
    ("rental_date", "r.rental_date"),
    ("return_date", "r.return_date"),
    ("customer_name", "customer_name"),
    ("film_title", "film_title"),
    ("days_overdue", "days_overdue"),
    ("late_fee", "late_fee"),
];

fn days_overdue_sql() -> String {
    format!(
        "CASE WHEN r.return_date IS NULL AND date(:today) > {DUE_DATE_SQL} \
         THEN CAST(julianday(date(:today)) - julianday({DUE_DATE_SQL}) AS INTEGER) ELSE 0 END"
    )
}

fn rental_select() -> String {
    let days = days_overdue_sql();
    format!(
        r#"
        SELECT r.rental_id, r.rental_date, r.inventory_id, r.customer_id,
               r.return_date, r.staff_id, r.last_update,
               i.film_id, i.store_id,
               f.title AS film_title, f.rental_rate AS film_rental_rate, f.rental_duration,
               c.first_name || ' ' || c.last_name AS customer_name,
               c.email AS customer_email,
               s.first_name || ' ' || s.last_name AS staff_name,
               {days} AS days_overdue,
               ({days}) * f.rental_rate * 1.5 AS late_fee
        FROM rental r
        JOIN inventory i ON r.inventory_id = i.inventory_id
        JOIN film f ON i.film_id = f.film_id
        JOIN customer c ON r.customer_id = c.customer_id
        JOIN staff s ON r.staff_id = s.staff_id
        "#
    )
}

/// Evaluate the rental rules for a row carrying `rental_date`,
/// `return_date`, `rental_duration` and the rate under `rate_key`.
fn summarize(record: &Record, rate_key: &str, today: NaiveDate) -> Option<RentalSummary> {
    let rental_date = record
        .get("rental_date")
        .and_then(Value::as_str)
        .and_then(|raw| parse_timestamp(raw).ok())?;
    let return_date = match record.get("return_date") {
        Some(Value::String(raw)) => Some(parse_timestamp(raw).ok()?),
        _ => None,
    };
    let duration = record.get("rental_duration").and_then(Value::as_i64)?;
    let rate = record.get(rate_key).and_then(Value::as_f64).unwrap_or(0.0);

    Some(RentalSummary::evaluate(
        rental_date,
        duration,
        rate,
        return_date,
        today,
    ))
}

/// Overwrite the derived columns of one rental row.
fn annotate(record: &mut Record, rate_key: &str, today: NaiveDate) {
    let Some(summary) = summarize(record, rate_key, today) else {
        tracing::warn!(rental_id = ?record.get("rental_id"), "unparseable rental dates");
        return;
    };

    record.insert("due_date".into(), format_timestamp(summary.due_date).into());
    record.insert("status".into(), summary.status.as_str().into());
    record.insert("overdue".into(), summary.is_overdue().into());
    record.insert("days_overdue".into(), summary.days_overdue.into());
    record.insert("late_fee".into(), summary.late_fee.into());
}

fn column_id(record: &Record, column: &str) -> SqlValue {
    record.get(column).and_then(Value::as_i64).into()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalQuery {
    #[serde(default, deserialize_with = "params::opt")]
    pub customer_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub film_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub store_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub staff_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub status: Option<StatusFilter>,
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
    pub page_size: Option<u32>,
}

/// GET /rentals
pub async fn list_rentals(
    State(state): State<AppState>,
    Query(query): Query<RentalQuery>,
) -> ApiResult<Json<PageBody>> {
    let today = state.clock.today();

    let mut filter = WhereClause::new();
    filter
        .bind(":today", state.clock.today_param())
        .push_opt("r.customer_id = :customerId", ":customerId", query.customer_id)
        .push_opt("i.film_id = :filmId", ":filmId", query.film_id)
        .push_opt("i.store_id = :storeId", ":storeId", query.store_id)
        .push_opt("r.staff_id = :staffId", ":staffId", query.staff_id)
        .push_opt("date(r.rental_date) >= date(:startDate)", ":startDate", query.start_date.clone())
        .push_opt("date(r.rental_date) <= date(:endDate)", ":endDate", query.end_date.clone());
    if let Some(predicate) = query
        .status
        .unwrap_or_default()
        .predicate("r.return_date", DUE_DATE_SQL)
    {
        filter.push(predicate);
    }

    let order = OrderBy::resolve(
        query.sort_by.as_deref(),
        SORT_COLUMNS,
        "r.rental_date",
        SortDirection::parse(query.sort_direction.as_deref(), SortDirection::Desc),
    );

    let sql = format!("{}{}{}, r.rental_id DESC", rental_select(), filter.to_sql(), order.to_sql());
    let pagination = Pagination::from_query(query.page, query.page_size, 10);

    state
        .db
        .call(move |session| -> ApiResult<Json<PageBody>> {
            let mut page = session
                .paginate(&sql, filter.params(), pagination)
                .context("Failed to load rentals")?;

            for record in page.items.iter_mut() {
                annotate(record, "film_rental_rate", today);
            }

            Ok(Json(page.into()))
        })
        .await
}

#[derive(Debug, Serialize)]
pub struct RentalDetail {
    pub rental: Record,
    pub payments: Vec<Record>,
    pub additional_info: AdditionalInfo,
}

#[derive(Debug, Serialize)]
pub struct AdditionalInfo {
    pub available_inventory: i64,
}

/// GET /rentals/{id}
pub async fn get_rental(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<RentalDetail>> {
    let rental_id = parse_id(&raw_id, "rental")?;
    let today = state.clock.today();
    let params = Params::new()
        .bind(":rentalId", rental_id)
        .bind(":today", state.clock.today_param());

    state
        .db
        .call(move |session| -> ApiResult<Json<RentalDetail>> {
            let mut rental = session
                .get(
                    r#"
                    SELECT r.rental_id, r.rental_date, r.inventory_id, r.customer_id,
                           r.return_date, r.staff_id, r.last_update,
                           i.film_id, i.store_id,
                           f.title AS film_title, f.description AS film_description,
                           f.release_year, f.language_id, f.original_language_id,
                           f.rental_duration, f.rental_rate AS film_rental_rate, f.length,
                           f.replacement_cost, f.rating, f.special_features,
                           l.name AS language_name,
                           c.first_name || ' ' || c.last_name AS customer_name,
                           c.email AS customer_email,
                           s.first_name || ' ' || s.last_name AS staff_name,
                           a.address AS store_address, ci.city AS store_city, co.country AS store_country
                    FROM rental r
                    JOIN inventory i ON r.inventory_id = i.inventory_id
                    JOIN film f ON i.film_id = f.film_id
                    JOIN language l ON f.language_id = l.language_id
                    JOIN customer c ON r.customer_id = c.customer_id
                    JOIN staff s ON r.staff_id = s.staff_id
                    JOIN store st ON i.store_id = st.store_id
                    JOIN address a ON st.address_id = a.address_id
                    JOIN city ci ON a.city_id = ci.city_id
                    JOIN country co ON ci.country_id = co.country_id
                    WHERE r.rental_id = :rentalId
                    "#,
                    &params,
                )
                .context("Failed to load rental")?
                .ok_or_else(|| ApiError::not_found("Rental not found"))?;
            annotate(&mut rental, "film_rental_rate", today);

            let payments = session
                .query(
                    "SELECT payment_id, amount, payment_date FROM payment WHERE rental_id = :rentalId ORDER BY payment_date",
                    &params,
                )
                .context("Failed to load rental payments")?;

            let available_inventory = session
                .count(
                    r#"
                    SELECT COUNT(*)
                    FROM inventory i
                    LEFT JOIN rental r ON i.inventory_id = r.inventory_id AND r.return_date IS NULL
                    WHERE i.film_id = :filmId AND i.store_id = :storeId AND r.rental_id IS NULL
                    "#,
                    &Params::new()
                        .bind(":filmId", rental.get("film_id").and_then(Value::as_i64))
                        .bind(":storeId", rental.get("store_id").and_then(Value::as_i64)),
                )
                .context("Failed to count available inventory")?;

            Ok(Json(RentalDetail {
                rental,
                payments,
                additional_info: AdditionalInfo {
                    available_inventory,
                },
            }))
        })
        .await
}

#[derive(Debug, Default, Deserialize)]
pub struct NewRental {
    pub inventory_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub staff_id: Option<i64>,
    pub return_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RentalCreated {
    pub message: &'static str,
    pub rental: Option<Record>,
}

/// POST /rentals
///
/// Checks the copy is on the shelf, then records the rental and its
/// rental-rate payment together.
pub async fn create_rental(
    State(state): State<AppState>,
    Json(data): Json<NewRental>,
) -> ApiResult<(StatusCode, Json<RentalCreated>)> {
    let present = |v: Option<i64>| v.is_some_and(|n| n != 0);
    ValidationError::require(&[
        ("inventory_id", present(data.inventory_id)),
        ("customer_id", present(data.customer_id)),
        ("staff_id", present(data.staff_id)),
    ])?;

    let now = format_timestamp(state.clock.now());
    let today = state.clock.today();
    let today_param = state.clock.today_param();
    let inventory = Params::new().bind(":inventoryId", data.inventory_id);

    state
        .db
        .call(move |session| -> ApiResult<(StatusCode, Json<RentalCreated>)> {
            let rental_id = session.transaction(|tx| -> ApiResult<i64> {
                let rate = tx
                    .get(
                        r#"
                        SELECT f.rental_rate
                        FROM inventory i
                        JOIN film f ON i.film_id = f.film_id
                        LEFT JOIN rental r ON i.inventory_id = r.inventory_id AND r.return_date IS NULL
                        WHERE i.inventory_id = :inventoryId AND r.rental_id IS NULL
                        "#,
                        &inventory,
                    )
                    .context("Failed to check inventory")?
                    .and_then(|row| row.get("rental_rate").and_then(Value::as_f64))
                    .ok_or_else(|| {
                        ApiError::bad_request("Inventory item is not available for rental")
                    })?;

                let rental_id = tx
                    .insert(
                        "rental",
                        &[
                            ("inventory_id", data.inventory_id.into()),
                            ("customer_id", data.customer_id.into()),
                            ("staff_id", data.staff_id.into()),
                            ("rental_date", now.as_str().into()),
                            ("return_date", data.return_date.clone().into()),
                            ("last_update", now.as_str().into()),
                        ],
                    )
                    .context("Failed to create rental")?;

                tx.insert(
                    "payment",
                    &[
                        ("customer_id", data.customer_id.into()),
                        ("staff_id", data.staff_id.into()),
                        ("rental_id", rental_id.into()),
                        ("amount", rate.into()),
                        ("payment_date", now.as_str().into()),
                        ("last_update", now.as_str().into()),
                    ],
                )
                .context("Failed to record rental payment")?;

                Ok(rental_id)
            })?;

            tracing::info!(rental_id, inventory_id = ?data.inventory_id, "rental created");

            let params = Params::new()
                .bind(":rentalId", rental_id)
                .bind(":today", today_param);
            let mut rental = session
                .get(&format!("{} WHERE r.rental_id = :rentalId", rental_select()), &params)
                .context("Failed to load created rental")?;
            if let Some(record) = rental.as_mut() {
                annotate(record, "film_rental_rate", today);
            }

            Ok((
                StatusCode::CREATED,
                Json(RentalCreated {
                    message: "Rental created",
                    rental,
                }),
            ))
        })
        .await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnReceipt {
    pub rental_id: i64,
    pub return_date: String,
    pub was_overdue: bool,
    pub days_overdue: i64,
    pub late_fee: f64,
    pub late_payment_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Returned {
    pub message: &'static str,
    pub rental: ReturnReceipt,
}

/// PUT /rentals/{id}/return
///
/// Stamps the return date and, for an overdue rental, charges the late fee
/// as a payment in the same transaction.
pub async fn return_rental(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Returned>> {
    let rental_id = parse_id(&raw_id, "rental")?;
    let now = state.clock.now();
    let return_date = format_timestamp(now);

    state
        .db
        .call(move |session| -> ApiResult<Json<Returned>> {
            let receipt = session.transaction(|tx| -> ApiResult<ReturnReceipt> {
                let rental = tx
                    .get(
                        r#"
                        SELECT r.rental_id, r.rental_date, r.return_date, r.customer_id, r.staff_id,
                               f.rental_rate, f.rental_duration
                        FROM rental r
                        JOIN inventory i ON r.inventory_id = i.inventory_id
                        JOIN film f ON i.film_id = f.film_id
                        WHERE r.rental_id = :rentalId
                        "#,
                        &Params::new().bind(":rentalId", rental_id),
                    )
                    .context("Failed to load rental")?
                    .ok_or_else(|| ApiError::not_found("Rental not found"))?;

                if let Some(Value::String(returned)) = rental.get("return_date") {
                    return Err(ApiError::bad_request("Rental has already been returned")
                        .with_field("returnDate", returned.clone()));
                }

                let summary = summarize(&rental, "rental_rate", now.date()).ok_or_else(|| {
                    ApiError::Validation(ValidationError::InvalidValue {
                        field: "rental_date",
                        reason: "stored rental date is not a valid timestamp".into(),
                    })
                })?;

                tx.update(
                    "rental",
                    "rental_id",
                    rental_id,
                    &[
                        ("return_date", return_date.as_str().into()),
                        ("last_update", return_date.as_str().into()),
                    ],
                )
                .context("Failed to record return")?;

                let fee = round_cents(summary.late_fee);
                let late_payment_id = if summary.is_overdue() && fee > 0.0 {
                    let id = tx
                        .insert(
                            "payment",
                            &[
                                ("customer_id", column_id(&rental, "customer_id")),
                                ("staff_id", column_id(&rental, "staff_id")),
                                ("rental_id", rental_id.into()),
                                ("amount", fee.into()),
                                ("payment_date", return_date.as_str().into()),
                                ("last_update", return_date.as_str().into()),
                            ],
                        )
                        .context("Failed to record late fee")?;
                    Some(id)
                } else {
                    None
                };

                Ok(ReturnReceipt {
                    rental_id,
                    return_date: return_date.clone(),
                    was_overdue: summary.is_overdue(),
                    days_overdue: summary.days_overdue,
                    late_fee: fee,
                    late_payment_id,
                })
            })?;

            tracing::info!(
                rental_id,
                days_overdue = receipt.days_overdue,
                late_fee = receipt.late_fee,
                "rental returned"
            );

            Ok(Json(Returned {
                message: "Rental returned",
                rental: receipt,
            }))
        })
        .await
}

#[cfg(test)]
mod tests {
    use crate::test_support::{get_json, sakila_app, send_json};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    fn ids(body: &Value) -> Vec<i64> {
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["rental_id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn newest_rentals_first_by_default() {
        let app = sakila_app();
        let (status, body) = get_json(&app, "/sakila/api/rentals").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), [2, 3, 1, 4]);
    }

    #[tokio::test]
    async fn overdue_filter_and_fee() {
        let app = sakila_app();
        let (_, body) = get_json(&app, "/sakila/api/rentals?status=overdue").await;

        assert_eq!(ids(&body), [3]);
        let rental = &body["data"][0];
        assert_eq!(rental["status"], "overdue");
        assert_eq!(rental["overdue"], true);
        assert_eq!(rental["days_overdue"], 7);
        assert_eq!(rental["due_date"], "2024-06-08 08:00:00");
        let fee = rental["late_fee"].as_f64().unwrap();
        assert!((fee - 7.0 * 4.99 * 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn due_today_is_outstanding_not_overdue() {
        let app = sakila_app();
        let (_, body) = get_json(&app, "/sakila/api/rentals?status=outstanding").await;

        assert_eq!(ids(&body), [2]);
        assert_eq!(body["data"][0]["status"], "outstanding");
        assert_eq!(body["data"][0]["late_fee"], 0.0);
    }

    #[tokio::test]
    async fn returned_filter_and_date_range() {
        let app = sakila_app();
        let (_, body) = get_json(&app, "/sakila/api/rentals?status=returned").await;
        assert_eq!(ids(&body), [1, 4]);

        let (_, body) =
            get_json(&app, "/sakila/api/rentals?startDate=2024-06-01&endDate=2024-06-06").await;
        assert_eq!(ids(&body), [3, 1]);
    }

    #[tokio::test]
    async fn sorts_by_late_fee() {
        let app = sakila_app();
        let (_, body) = get_json(&app, "/sakila/api/rentals?sortBy=late_fee").await;
        assert_eq!(ids(&body)[0], 3);
    }

    #[tokio::test]
    async fn detail_reports_shelf_availability() {
        let app = sakila_app();
        let (status, body) = get_json(&app, "/sakila/api/rentals/3").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rental"]["status"], "overdue");
        assert_eq!(body["rental"]["store_city"], "Lethbridge");
        assert_eq!(body["payments"].as_array().unwrap().len(), 1);
        assert_eq!(body["additional_info"]["available_inventory"], 0);
    }

    #[tokio::test]
    async fn return_charges_late_fee() {
        let app = sakila_app();
        let (status, body) =
            send_json(&app, "PUT", "/sakila/api/rentals/3/return", json!(null)).await;

        assert_eq!(status, StatusCode::OK);
        let receipt = &body["rental"];
        assert_eq!(receipt["rentalId"], 3);
        assert_eq!(receipt["returnDate"], "2024-06-15 12:00:00");
        assert_eq!(receipt["wasOverdue"], true);
        assert_eq!(receipt["daysOverdue"], 7);
        assert!((receipt["lateFee"].as_f64().unwrap() - 52.395).abs() < 0.01);
        assert_eq!(receipt["latePaymentId"], 6);

        let (_, detail) = get_json(&app, "/sakila/api/rentals/3").await;
        assert_eq!(detail["rental"]["status"], "returned");
        assert_eq!(detail["payments"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn return_on_time_charges_nothing() {
        let app = sakila_app();
        let (status, body) =
            send_json(&app, "PUT", "/sakila/api/rentals/2/return", json!(null)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rental"]["wasOverdue"], false);
        assert_eq!(body["rental"]["latePaymentId"], Value::Null);
    }

    #[tokio::test]
    async fn return_twice_is_rejected() {
        let app = sakila_app();
        let (status, body) =
            send_json(&app, "PUT", "/sakila/api/rentals/1/return", json!(null)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["returnDate"], "2024-06-05 10:00:00");

        let (status, _) =
            send_json(&app, "PUT", "/sakila/api/rentals/999/return", json!(null)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn checkout_requires_a_shelved_copy() {
        let app = sakila_app();
        let (status, _) = send_json(
            &app,
            "POST",
            "/sakila/api/rentals",
            json!({"inventory_id": 3, "customer_id": 1, "staff_id": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send_json(
            &app,
            "POST",
            "/sakila/api/rentals",
            json!({"inventory_id": 2, "customer_id": 1, "staff_id": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["rental"]["rental_id"], 5);
        assert_eq!(body["rental"]["status"], "outstanding");

        let (_, detail) = get_json(&app, "/sakila/api/rentals/5").await;
        assert_eq!(detail["payments"][0]["amount"], 0.99);
    }

    #[tokio::test]
    async fn checkout_validates_fields() {
        let app = sakila_app();
        let (status, body) =
            send_json(&app, "POST", "/sakila/api/rentals", json!({"inventory_id": 2})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Missing required fields: customer_id, staff_id"
        );
    }
}
