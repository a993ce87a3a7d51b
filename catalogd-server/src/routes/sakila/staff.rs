use axum::extract::{Query, State};
use axum::Json;
use catalogd_core::{Params, WhereClause};
use serde::{Deserialize, Serialize};

use crate::db::{Record, SqlExecutor};
use crate::error::{ApiResult, DbContext};
use crate::params;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffQuery {
    #[serde(default, deserialize_with = "params::text")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "params::opt")]
    pub store_id: Option<i64>,
    #[serde(default, deserialize_with = "params::flag")]
    pub active_only: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StaffSummary {
    pub total_staff: i64,
    pub active_staff: i64,
    pub inactive_staff: i64,
}

#[derive(Debug, Serialize)]
pub struct StaffList {
    pub staff: Vec<Record>,
    pub summary: StaffSummary,
}

/// GET /staff
pub async fn list_staff(
    State(state): State<AppState>,
    Query(query): Query<StaffQuery>,
) -> ApiResult<Json<StaffList>> {
    let mut filter = WhereClause::new();
    filter
        .like_opt(
            "(s.first_name LIKE :search OR s.last_name LIKE :search OR s.email LIKE :search OR s.username LIKE :search)",
            ":search",
            query.search.as_deref(),
        )
        .push_opt("s.store_id = :storeId", ":storeId", query.store_id);
    if query.active_only == Some(true) {
        filter.push("s.active = 1");
    }

    let sql = format!(
        r#"
        SELECT s.staff_id, s.first_name, s.last_name, s.address_id, s.email,
               s.store_id, s.active, s.username, s.last_update,
               a.address, c.city, co.country, a.postal_code, a.phone,
               (SELECT sc.city FROM store st
                  JOIN address sa ON st.address_id = sa.address_id
                  JOIN city sc ON sa.city_id = sc.city_id
                WHERE st.store_id = s.store_id) AS store_name,
               (SELECT COUNT(*) FROM rental r WHERE r.staff_id = s.staff_id) AS rental_count,
               (SELECT COUNT(*) FROM payment p WHERE p.staff_id = s.staff_id) AS payment_count,
               (SELECT COALESCE(SUM(amount), 0) FROM payment p WHERE p.staff_id = s.staff_id) AS total_revenue
        FROM staff s
        JOIN address a ON s.address_id = a.address_id
        JOIN city c ON a.city_id = c.city_id
        JOIN country co ON c.country_id = co.country_id
        {}
        ORDER BY s.staff_id
        "#,
        filter.to_sql()
    );

    state
        .db
        .call(move |session| -> ApiResult<Json<StaffList>> {
            let staff = session
                .query(&sql, filter.params())
                .context("Failed to load staff")?;

            let summary = session
                .get_as::<StaffSummary>(
                    r#"
                    SELECT COUNT(*) AS total_staff,
                           COALESCE(SUM(CASE WHEN active = 1 THEN 1 ELSE 0 END), 0) AS active_staff,
                           COALESCE(SUM(CASE WHEN active = 0 THEN 1 ELSE 0 END), 0) AS inactive_staff
                    FROM staff
                    "#,
                    &Params::new(),
                )
                .context("Failed to load staff summary")?
                .unwrap_or(StaffSummary {
                    total_staff: 0,
                    active_staff: 0,
                    inactive_staff: 0,
                });

            Ok(Json(StaffList { staff, summary }))
        })
        .await
}

#[cfg(test)]
mod tests {
    use crate::test_support::{get_json, sakila_app};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn staff_with_activity() {
        let app = sakila_app();
        let (status, body) = get_json(&app, "/sakila/api/staff").await;
        assert_eq!(status, StatusCode::OK);

        let mike = &body["staff"][0];
        assert_eq!(mike["store_name"], "Lethbridge");
        assert_eq!(mike["rental_count"], 2);
        assert_eq!(mike["payment_count"], 3);
        assert!((mike["total_revenue"].as_f64().unwrap() - 6.98).abs() < 1e-9);

        assert_eq!(body["summary"]["total_staff"], 2);
        assert_eq!(body["summary"]["active_staff"], 2);
        assert_eq!(body["summary"]["inactive_staff"], 0);
    }

    #[tokio::test]
    async fn staff_filters() {
        let app = sakila_app();
        let (_, body) = get_json(&app, "/sakila/api/staff?storeId=2").await;
        assert_eq!(body["staff"].as_array().unwrap().len(), 1);
        assert_eq!(body["staff"][0]["username"], "Jon");

        let (_, body) = get_json(&app, "/sakila/api/staff?search=hilly&activeOnly=true").await;
        assert_eq!(body["staff"].as_array().unwrap().len(), 1);
        // Summary ignores filters
        assert_eq!(body["summary"]["total_staff"], 2);
    }
}
