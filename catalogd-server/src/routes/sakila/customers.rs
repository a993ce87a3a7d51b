//! Customer CRUD. Deletion is a soft deactivation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use catalogd_core::{
    format_timestamp, OrderBy, Pagination, Params, SortDirection, SqlValue, ValidationError,
    WhereClause,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PageBody;
use crate::db::{Record, SqlExecutor};
use crate::error::{ApiError, ApiResult, DbContext};
use crate::ids::parse_id;
use crate::params;
use crate::routes::pick_columns;
use crate::state::AppState;

const CUSTOMER_SELECT: &str = r#"
    SELECT c.customer_id, c.store_id, c.first_name, c.last_name, c.email,
           c.address_id, c.active, c.create_date, c.last_update,
           a.address, a.address2, a.district, a.city_id, a.postal_code, a.phone,
           ci.city AS city_name, co.country AS country_name
    FROM customer c
    JOIN address a ON c.address_id = a.address_id
    JOIN city ci ON a.city_id = ci.city_id
    JOIN country co ON ci.country_id = co.country_id
"#;

const SORT_COLUMNS: &[(&str, &str)] = &[
    ("last_name", "c.last_name"),
    ("first_name", "c.first_name"),
    ("email", "c.email"),
    ("create_date", "c.create_date"),
    ("rental_count", "rental_count"),
    ("total_payments", "total_payments"),
];

const CUSTOMER_FIELDS: &[&str] = &["first_name", "last_name", "email", "store_id", "active"];
const ADDRESS_FIELDS: &[&str] = &["address", "address2", "district", "city_id", "postal_code", "phone"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerQuery {
    #[serde(default, deserialize_with = "params::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "params::text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "params::flag")]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "params::opt")]
    pub store_id: Option<i64>,
    #[serde(default, deserialize_with = "params::text")]
    pub sort_by: Option<String>,
    #[serde(default, deserialize_with = "params::text")]
    pub sort_direction: Option<String>,
    #[serde(default, deserialize_with = "params::opt")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "params::opt")]
    pub page_size: Option<u32>,
}

/// GET /customers
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerQuery>,
) -> ApiResult<Json<PageBody>> {
    let mut filter = WhereClause::new();
    filter
        .like_opt(
            "(c.first_name LIKE :name OR c.last_name LIKE :name)",
            ":name",
            query.name.as_deref(),
        )
        .like_opt("c.email LIKE :email", ":email", query.email.as_deref())
        .push_opt("c.active = :active", ":active", query.active)
        .push_opt("c.store_id = :storeId", ":storeId", query.store_id);

    let order = OrderBy::resolve(
        query.sort_by.as_deref(),
        SORT_COLUMNS,
        "c.last_name",
        SortDirection::parse(query.sort_direction.as_deref(), SortDirection::Asc),
    );

    let sql = format!(
        r#"
        SELECT c.customer_id, c.store_id, c.first_name, c.last_name, c.email,
               c.address_id, c.active, c.create_date, c.last_update,
               a.address, a.address2, a.district, a.postal_code, a.phone,
               ci.city AS city_name, co.country AS country_name,
               (SELECT COUNT(*) FROM rental r WHERE r.customer_id = c.customer_id) AS rental_count,
               (SELECT COALESCE(SUM(p.amount), 0) FROM payment p WHERE p.customer_id = c.customer_id) AS total_payments
        FROM customer c
        JOIN address a ON c.address_id = a.address_id
        JOIN city ci ON a.city_id = ci.city_id
        JOIN country co ON ci.country_id = co.country_id
        {}{}, c.customer_id
        "#,
        filter.to_sql(),
        order.to_sql()
    );

    let pagination = Pagination::from_query(query.page, query.page_size, 10);

    state
        .db
        .call(move |session| -> ApiResult<Json<PageBody>> {
            let page = session
                .paginate(&sql, filter.params(), pagination)
                .context("Failed to load customers")?;

            Ok(Json(page.into()))
        })
        .await
}

#[derive(Debug, Default, Deserialize)]
pub struct NewCustomer {
    pub store_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub address2: Option<String>,
    pub district: Option<String>,
    pub city_id: Option<i64>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub active: Option<bool>,
}

impl NewCustomer {
    fn validate(&self) -> Result<(), ValidationError> {
        let text = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let id = |v: &Option<i64>| v.is_some_and(|n| n != 0);

        ValidationError::require(&[
            ("store_id", id(&self.store_id)),
            ("first_name", text(&self.first_name)),
            ("last_name", text(&self.last_name)),
            ("email", text(&self.email)),
            ("address", text(&self.address)),
            ("district", text(&self.district)),
            ("city_id", id(&self.city_id)),
            ("phone", text(&self.phone)),
        ])
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerSaved {
    pub message: &'static str,
    pub customer: Option<Record>,
}

/// POST /customers
///
/// Address and customer rows are written in one transaction.
pub async fn create_customer(
    State(state): State<AppState>,
    Json(data): Json<NewCustomer>,
) -> ApiResult<(StatusCode, Json<CustomerSaved>)> {
    data.validate()?;
    let now = format_timestamp(state.clock.now());

    state
        .db
        .call(move |session| -> ApiResult<(StatusCode, Json<CustomerSaved>)> {
            let customer_id = session.transaction(|tx| -> ApiResult<i64> {
                let address_id = tx
                    .insert(
                        "address",
                        &[
                            ("address", data.address.clone().into()),
                            ("address2", data.address2.clone().into()),
                            ("district", data.district.clone().into()),
                            ("city_id", data.city_id.into()),
                            ("postal_code", data.postal_code.clone().into()),
                            ("phone", data.phone.clone().into()),
                            ("last_update", now.as_str().into()),
                        ],
                    )
                    .context("Failed to create customer address")?;

                tx.insert(
                    "customer",
                    &[
                        ("store_id", data.store_id.into()),
                        ("first_name", data.first_name.clone().into()),
                        ("last_name", data.last_name.clone().into()),
                        ("email", data.email.clone().into()),
                        ("address_id", address_id.into()),
                        ("active", data.active.unwrap_or(true).into()),
                        ("create_date", now.as_str().into()),
                        ("last_update", now.as_str().into()),
                    ],
                )
                .context("Failed to create customer")
            })?;

            tracing::info!(customer_id, "customer created");

            let customer = session
                .get(
                    &format!("{CUSTOMER_SELECT} WHERE c.customer_id = :customerId"),
                    &Params::new().bind(":customerId", customer_id),
                )
                .context("Failed to load created customer")?;

            Ok((
                StatusCode::CREATED,
                Json(CustomerSaved {
                    message: "Customer created",
                    customer,
                }),
            ))
        })
        .await
}

/// GET /customers/{id}
pub async fn get_customer(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Record>> {
    let customer_id = parse_id(&raw_id, "customer")?;
    let params = Params::new().bind(":customerId", customer_id);

    state
        .db
        .call(move |session| -> ApiResult<Json<Record>> {
            let mut customer = session
                .get(
                    r#"
                    SELECT c.customer_id, c.store_id, c.first_name, c.last_name, c.email,
                           c.address_id, c.active, c.create_date, c.last_update,
                           a.address, a.address2, a.district, a.city_id, a.postal_code, a.phone,
                           a.last_update AS address_last_update,
                           ci.city AS city_name, co.country AS country_name,
                           (SELECT COUNT(*) FROM rental r WHERE r.customer_id = c.customer_id) AS rental_count,
                           (SELECT COALESCE(SUM(p.amount), 0) FROM payment p WHERE p.customer_id = c.customer_id) AS total_payments
                    FROM customer c
                    JOIN address a ON c.address_id = a.address_id
                    JOIN city ci ON a.city_id = ci.city_id
                    JOIN country co ON ci.country_id = co.country_id
                    WHERE c.customer_id = :customerId
                    "#,
                    &params,
                )
                .context("Failed to load customer")?
                .ok_or_else(|| ApiError::not_found("Customer not found"))?;

            let rentals = session
                .query(
                    r#"
                    SELECT r.rental_id, r.rental_date, r.return_date,
                           f.film_id, f.title, f.rental_rate,
                           p.amount AS payment_amount, p.payment_date
                    FROM rental r
                    JOIN inventory i ON r.inventory_id = i.inventory_id
                    JOIN film f ON i.film_id = f.film_id
                    LEFT JOIN payment p ON r.rental_id = p.rental_id
                    WHERE r.customer_id = :customerId
                    ORDER BY r.rental_date DESC
                    LIMIT 10
                    "#,
                    &params,
                )
                .context("Failed to load customer rentals")?;

            let payments = session
                .get(
                    r#"
                    SELECT COUNT(*) AS payment_count,
                           COALESCE(SUM(amount), 0) AS total_amount,
                           COALESCE(AVG(amount), 0) AS avg_amount,
                           MAX(payment_date) AS last_payment_date
                    FROM payment
                    WHERE customer_id = :customerId
                    "#,
                    &params,
                )
                .context("Failed to load customer payments")?;

            customer.insert(
                "rentals".into(),
                Value::Array(rentals.into_iter().map(Value::Object).collect()),
            );
            customer.insert(
                "payments".into(),
                payments.map(Value::Object).unwrap_or(Value::Null),
            );

            Ok(Json(customer))
        })
        .await
}

/// PUT /customers/{id}
///
/// Only keys present in the body are written; customer and address changes
/// commit together.
pub async fn update_customer(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> ApiResult<Json<CustomerSaved>> {
    let customer_id = parse_id(&raw_id, "customer")?;
    let params = Params::new().bind(":customerId", customer_id);
    let now = format_timestamp(state.clock.now());

    state
        .db
        .call(move |session| -> ApiResult<Json<CustomerSaved>> {
            let address_id = session
                .get(
                    "SELECT customer_id, address_id FROM customer WHERE customer_id = :customerId",
                    &params,
                )
                .context("Failed to load customer")?
                .and_then(|row| row.get("address_id").and_then(Value::as_i64))
                .ok_or_else(|| ApiError::not_found("Customer not found"))?;

            let mut customer_changes = pick_columns(&body, CUSTOMER_FIELDS);
            for (column, value) in customer_changes.iter_mut() {
                if *column == "active" {
                    *value = SqlValue::from(truthy(body.get("active")));
                }
            }
            let address_changes = pick_columns(&body, ADDRESS_FIELDS);

            session.transaction(|tx| -> ApiResult<()> {
                if !customer_changes.is_empty() {
                    customer_changes.push(("last_update", now.as_str().into()));
                    tx.update("customer", "customer_id", customer_id, &customer_changes)
                        .context("Failed to update customer")?;
                }
                if !address_changes.is_empty() {
                    let mut address_changes = address_changes;
                    address_changes.push(("last_update", now.as_str().into()));
                    tx.update("address", "address_id", address_id, &address_changes)
                        .context("Failed to update customer address")?;
                }
                Ok(())
            })?;

            let customer = session
                .get(&format!("{CUSTOMER_SELECT} WHERE c.customer_id = :customerId"), &params)
                .context("Failed to load updated customer")?;

            Ok(Json(CustomerSaved {
                message: "Customer updated",
                customer,
            }))
        })
        .await
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

/// DELETE /customers/{id}
///
/// Refused while the customer still has films out.
pub async fn deactivate_customer(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Message>> {
    let customer_id = parse_id(&raw_id, "customer")?;
    let params = Params::new().bind(":customerId", customer_id);
    let now = format_timestamp(state.clock.now());

    state
        .db
        .call(move |session| -> ApiResult<Json<Message>> {
            session
                .get("SELECT customer_id FROM customer WHERE customer_id = :customerId", &params)
                .context("Failed to load customer")?
                .ok_or_else(|| ApiError::not_found("Customer not found"))?;

            let open_rentals = session
                .count(
                    "SELECT COUNT(*) FROM rental WHERE customer_id = :customerId AND return_date IS NULL",
                    &params,
                )
                .context("Failed to check customer rentals")?;
            if open_rentals > 0 {
                return Err(ApiError::bad_request(
                    "Customer has unreturned rentals and cannot be deactivated",
                )
                .with_field("openRentals", open_rentals));
            }

            session
                .update(
                    "customer",
                    "customer_id",
                    customer_id,
                    &[
                        ("active", 0_i64.into()),
                        ("last_update", now.into()),
                    ],
                )
                .context("Failed to deactivate customer")?;

            tracing::info!(customer_id, "customer deactivated");
            Ok(Json(Message {
                message: "Customer deactivated",
            }))
        })
        .await
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use crate::db::SqlExecutor;
    use crate::test_support::{get_json, sakila_app_with_db, send_json};
    use axum::http::StatusCode;
    use catalogd_core::Params;
    use serde_json::json;

    #[tokio::test]
    async fn filters_by_store_and_active() {
        let (app, _) = sakila_app_with_db();
        let (status, body) =
            get_json(&app, "/sakila/api/customers?storeId=2&active=true").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["last_name"], "JOHNSON");
    }

    #[tokio::test]
    async fn pages_sorted_by_last_name() {
        let (app, _) = sakila_app_with_db();
        let (_, body) = get_json(&app, "/sakila/api/customers?page=2&pageSize=2").await;

        assert_eq!(body["total"], 4);
        assert_eq!(body["pageCount"], 2);
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["last_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["SMITH", "WILLIAMS"]);
    }

    #[tokio::test]
    async fn detail_includes_rentals_and_payment_stats() {
        let (app, _) = sakila_app_with_db();
        let (status, body) = get_json(&app, "/sakila/api/customers/1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rental_count"], 2);
        assert_eq!(body["rentals"].as_array().unwrap().len(), 2);
        assert_eq!(body["payments"]["payment_count"], 2);
        assert_eq!(body["city_name"], "Lethbridge");
    }

    #[tokio::test]
    async fn create_requires_fields() {
        let (app, _) = sakila_app_with_db();
        let (status, body) = send_json(
            &app,
            "POST",
            "/sakila/api/customers",
            json!({"store_id": 1, "first_name": "ADA"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("last_name"));
    }

    #[tokio::test]
    async fn create_inserts_address_and_customer() {
        let (app, db) = sakila_app_with_db();
        let (status, body) = send_json(
            &app,
            "POST",
            "/sakila/api/customers",
            json!({
                "store_id": 1,
                "first_name": "ADA",
                "last_name": "LOVELACE",
                "email": "ada@example.com",
                "address": "12 Analytical Way",
                "district": "Alberta",
                "city_id": 1,
                "phone": "555-0100"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["customer"]["customer_id"], 5);
        assert_eq!(body["customer"]["city_name"], "Lethbridge");
        assert_eq!(body["customer"]["active"], 1);
        assert_eq!(body["customer"]["create_date"], "2024-06-15 12:00:00");

        let session = db.session().unwrap();
        let addresses = session
            .count("SELECT COUNT(*) FROM address", &Params::new())
            .unwrap();
        assert_eq!(addresses, 5);
    }

    #[tokio::test]
    async fn failed_create_rolls_back_the_address() {
        let (app, db) = sakila_app_with_db();
        let (status, _) = send_json(
            &app,
            "POST",
            "/sakila/api/customers",
            json!({
                "store_id": 99,
                "first_name": "GHOST",
                "last_name": "STORE",
                "email": "ghost@example.com",
                "address": "nowhere",
                "district": "void",
                "city_id": 1,
                "phone": "0"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let session = db.session().unwrap();
        let addresses = session
            .count("SELECT COUNT(*) FROM address", &Params::new())
            .unwrap();
        assert_eq!(addresses, 4);
    }

    #[tokio::test]
    async fn update_touches_only_given_fields() {
        let (app, _) = sakila_app_with_db();
        let (status, body) = send_json(
            &app,
            "PUT",
            "/sakila/api/customers/2",
            json!({"email": "patricia@example.org", "phone": "555-0199", "ignored": "x"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["customer"]["email"], "patricia@example.org");
        assert_eq!(body["customer"]["phone"], "555-0199");
        assert_eq!(body["customer"]["first_name"], "PATRICIA");
        assert_eq!(body["customer"]["last_update"], "2024-06-15 12:00:00");
    }

    #[tokio::test]
    async fn update_missing_customer_is_404() {
        let (app, _) = sakila_app_with_db();
        let (status, _) =
            send_json(&app, "PUT", "/sakila/api/customers/404", json!({"email": "x"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_refuses_customers_with_open_rentals() {
        let (app, _) = sakila_app_with_db();
        let (status, body) =
            send_json(&app, "DELETE", "/sakila/api/customers/1", json!(null)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["openRentals"], 1);
    }

    #[tokio::test]
    async fn delete_deactivates() {
        let (app, _) = sakila_app_with_db();
        let (status, _) =
            send_json(&app, "DELETE", "/sakila/api/customers/4", json!(null)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = get_json(&app, "/sakila/api/customers/4").await;
        assert_eq!(body["active"], 0);
    }
}
