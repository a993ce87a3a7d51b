//! Reference data: categories, countries, cities, stores.

use axum::extract::{Query, State};
use axum::Json;
use catalogd_core::{Params, WhereClause};
use serde::Deserialize;

use crate::db::{Record, SqlExecutor};
use crate::error::{ApiResult, DbContext};
use crate::params;
use crate::state::AppState;

/// GET /categories
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Record>>> {
    state
        .db
        .call(move |session| -> ApiResult<Json<Vec<Record>>> {
            let categories = session
                .query(
                    r#"
                    SELECT c.category_id, c.name, c.last_update,
                           COUNT(fc.film_id) AS film_count
                    FROM category c
                    LEFT JOIN film_category fc ON c.category_id = fc.category_id
                    GROUP BY c.category_id
                    ORDER BY c.name
                    "#,
                    &Params::new(),
                )
                .context("Failed to load categories")?;

            Ok(Json(categories))
        })
        .await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryQuery {
    #[serde(default, deserialize_with = "params::text")]
    pub search: Option<String>,
}

/// GET /countries
pub async fn list_countries(
    State(state): State<AppState>,
    Query(query): Query<CountryQuery>,
) -> ApiResult<Json<Vec<Record>>> {
    let mut filter = WhereClause::new();
    filter.like_opt("co.country LIKE :search", ":search", query.search.as_deref());

    let sql = format!(
        r#"
        SELECT co.country_id, co.country, co.last_update,
               (SELECT COUNT(*) FROM city ci WHERE ci.country_id = co.country_id) AS city_count
        FROM country co
        {}
        ORDER BY co.country
        "#,
        filter.to_sql()
    );

    state
        .db
        .call(move |session| -> ApiResult<Json<Vec<Record>>> {
            let countries = session
                .query(&sql, filter.params())
                .context("Failed to load countries")?;

            Ok(Json(countries))
        })
        .await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityQuery {
    #[serde(default, deserialize_with = "params::opt")]
    pub country_id: Option<i64>,
    #[serde(default, deserialize_with = "params::text")]
    pub search: Option<String>,
}

/// GET /cities
pub async fn list_cities(
    State(state): State<AppState>,
    Query(query): Query<CityQuery>,
) -> ApiResult<Json<Vec<Record>>> {
    let mut filter = WhereClause::new();
    filter
        .push_opt("ci.country_id = :countryId", ":countryId", query.country_id)
        .like_opt("ci.city LIKE :search", ":search", query.search.as_deref());

    let sql = format!(
        r#"
        SELECT ci.city_id, ci.city, ci.country_id, co.country, ci.last_update
        FROM city ci
        JOIN country co ON ci.country_id = co.country_id
        {}
        ORDER BY co.country, ci.city
        "#,
        filter.to_sql()
    );

    state
        .db
        .call(move |session| -> ApiResult<Json<Vec<Record>>> {
            let cities = session
                .query(&sql, filter.params())
                .context("Failed to load cities")?;

            Ok(Json(cities))
        })
        .await
}

/// GET /stores
pub async fn list_stores(State(state): State<AppState>) -> ApiResult<Json<Vec<Record>>> {
    state
        .db
        .call(move |session| -> ApiResult<Json<Vec<Record>>> {
            let stores = session
                .query(
                    r#"
                    SELECT s.store_id, s.manager_staff_id, s.address_id, s.last_update,
                           m.first_name || ' ' || m.last_name AS manager_name,
                           a.address, a.address2, a.district, a.postal_code, a.phone,
                           ci.city_id, ci.city AS city_name,
                           co.country_id, co.country AS country_name,
                           (SELECT COUNT(*) FROM inventory i WHERE i.store_id = s.store_id) AS inventory_count,
                           (SELECT COUNT(*) FROM customer c WHERE c.store_id = s.store_id) AS customer_count,
                           (SELECT COUNT(*) FROM staff st WHERE st.store_id = s.store_id) AS staff_count
                    FROM store s
                    JOIN staff m ON s.manager_staff_id = m.staff_id
                    JOIN address a ON s.address_id = a.address_id
                    JOIN city ci ON a.city_id = ci.city_id
                    JOIN country co ON ci.country_id = co.country_id
                    ORDER BY s.store_id
                    "#,
                    &Params::new(),
                )
                .context("Failed to load stores")?;

            Ok(Json(stores))
        })
        .await
}
