//! Inventory copies with shelf availability.

use axum::extract::{Query, State};
use axum::Json;
use catalogd_core::{Pagination, Params, WhereClause};
use serde::{Deserialize, Serialize};

use crate::db::{Record, SqlExecutor};
use crate::error::{ApiResult, DbContext};
use crate::params;
use crate::state::AppState;

/// Open rental per copy; a copy with no row here is on the shelf.
const OPEN_RENTALS: &str = r#"
    SELECT inventory_id, MAX(rental_id) AS rental_id
    FROM rental
    WHERE return_date IS NULL
    GROUP BY inventory_id
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Availability {
    #[default]
    All,
    Available,
    Rented,
}

impl std::str::FromStr for Availability {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "available" => Self::Available,
            "rented" => Self::Rented,
            _ => Self::All,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryQuery {
    #[serde(default, deserialize_with = "params::text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "params::opt")]
    pub store_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub availability: Option<Availability>,
    #[serde(default, deserialize_with = "params::opt")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "params::opt")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_inventory: i64,
    pub available_inventory: i64,
    pub rented_inventory: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryPage {
    pub items: Vec<Record>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
    pub summary: InventorySummary,
}

/// GET /inventory
///
/// The summary always covers the whole inventory, not just the filtered
/// rows.
pub async fn list_inventory(
    State(state): State<AppState>,
    Query(query): Query<InventoryQuery>,
) -> ApiResult<Json<InventoryPage>> {
    let mut filter = WhereClause::new();
    filter
        .like_opt("f.title LIKE :title", ":title", query.title.as_deref())
        .push_opt("i.store_id = :storeId", ":storeId", query.store_id);
    match query.availability.unwrap_or_default() {
        Availability::Available => {
            filter.push("open_rental.rental_id IS NULL");
        }
        Availability::Rented => {
            filter.push("open_rental.rental_id IS NOT NULL");
        }
        Availability::All => {}
    }

    let sql = format!(
        r#"
        SELECT i.inventory_id, i.film_id, i.store_id,
               f.title, f.release_year, f.rental_rate, f.rental_duration,
               f.replacement_cost, f.rating,
               CASE WHEN open_rental.rental_id IS NULL THEN 1 ELSE 0 END AS is_available,
               (SELECT MAX(r.rental_date) FROM rental r WHERE r.inventory_id = i.inventory_id) AS last_rental_date,
               (SELECT MAX(r.return_date) FROM rental r WHERE r.inventory_id = i.inventory_id) AS last_return_date,
               cur.customer_id AS current_customer_id,
               c.first_name || ' ' || c.last_name AS current_customer_name
        FROM inventory i
        JOIN film f ON i.film_id = f.film_id
        LEFT JOIN ({OPEN_RENTALS}) open_rental ON i.inventory_id = open_rental.inventory_id
        LEFT JOIN rental cur ON cur.rental_id = open_rental.rental_id
        LEFT JOIN customer c ON cur.customer_id = c.customer_id
        {}
        ORDER BY i.inventory_id
        "#,
        filter.to_sql()
    );
    let pagination = Pagination::from_query(query.page, query.page_size, 20);

    state
        .db
        .call(move |session| -> ApiResult<Json<InventoryPage>> {
            let page = session
                .paginate(&sql, filter.params(), pagination)
                .context("Failed to load inventory")?;

            let summary = session
                .get_as::<InventorySummary>(
                    &format!(
                        r#"
                        SELECT COUNT(*) AS total_inventory,
                               COALESCE(SUM(CASE WHEN open_rental.rental_id IS NULL THEN 1 ELSE 0 END), 0) AS available_inventory,
                               COALESCE(SUM(CASE WHEN open_rental.rental_id IS NOT NULL THEN 1 ELSE 0 END), 0) AS rented_inventory
                        FROM inventory i
                        LEFT JOIN ({OPEN_RENTALS}) open_rental ON i.inventory_id = open_rental.inventory_id
                        "#
                    ),
                    &Params::new(),
                )
                .context("Failed to summarize inventory")?
                .unwrap_or_default();

            Ok(Json(InventoryPage {
                total_pages: page.total_pages(),
                total: page.total,
                page: page.page,
                page_size: page.page_size,
                items: page.items,
                summary,
            }))
        })
        .await
}

#[cfg(test)]
mod tests {
    use crate::test_support::{get_json, sakila_app};
    use axum::http::StatusCode;
    use serde_json::Value;

    fn ids(body: &Value) -> Vec<i64> {
        body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["inventory_id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn lists_every_copy_with_summary() {
        let app = sakila_app();
        let (status, body) = get_json(&app, "/sakila/api/inventory").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), [1, 2, 3, 4, 5]);
        assert_eq!(body["pageSize"], 20);
        assert_eq!(body["totalPages"], 1);
        assert_eq!(body["summary"]["total_inventory"], 5);
        assert_eq!(body["summary"]["available_inventory"], 3);
        assert_eq!(body["summary"]["rented_inventory"], 2);
    }

    #[tokio::test]
    async fn rented_copies_name_the_customer() {
        let app = sakila_app();
        let (_, body) = get_json(&app, "/sakila/api/inventory?availability=rented").await;

        assert_eq!(ids(&body), [3, 4]);
        assert_eq!(body["total"], 2);
        assert_eq!(body["items"][0]["is_available"], 0);
        assert_eq!(body["items"][0]["current_customer_name"], "PATRICIA JOHNSON");
        assert_eq!(body["summary"]["total_inventory"], 5);
    }

    #[tokio::test]
    async fn filters_by_store_and_title() {
        let app = sakila_app();
        let (_, body) =
            get_json(&app, "/sakila/api/inventory?storeId=1&availability=available").await;
        assert_eq!(ids(&body), [1, 2]);

        let (_, body) = get_json(&app, "/sakila/api/inventory?title=betrayed").await;
        assert_eq!(ids(&body), [4, 5]);
        assert_eq!(body["items"][1]["last_return_date"], "2024-05-10 12:00:00");
    }
}
