//! Film catalogue with per-film inventory availability.

use axum::extract::{Path, Query, State};
use axum::Json;
use catalogd_core::{OrderBy, Pagination, Params, SortDirection, WhereClause};
use serde::Deserialize;
use serde_json::Value;

use super::PageBody;
use crate::db::{Record, SqlExecutor};
use crate::error::{ApiError, ApiResult, DbContext};
use crate::ids::parse_id;
use crate::params;
use crate::state::AppState;

const FILM_COLUMNS: &str = r#"
    f.film_id, f.title, f.description, f.release_year, f.language_id,
    f.original_language_id, f.rental_duration, f.rental_rate, f.length,
    f.replacement_cost, f.rating, f.special_features, f.last_update,
    l.name AS language_name,
    (SELECT COUNT(*) FROM inventory i WHERE i.film_id = f.film_id) AS inventory_count,
    (SELECT COUNT(*) FROM inventory i
       LEFT JOIN rental r ON i.inventory_id = r.inventory_id AND r.return_date IS NULL
     WHERE i.film_id = f.film_id AND r.rental_id IS NULL) AS available_count
"#;

const SORT_COLUMNS: &[(&str, &str)] = &[
    ("title", "f.title"),
    ("release_year", "f.release_year"),
    ("rental_rate", "f.rental_rate"),
    ("length", "f.length"),
    ("rating", "f.rating"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmQuery {
    #[serde(default, deserialize_with = "params::text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "params::opt")]
    pub category_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub release_year: Option<i64>,
    #[serde(default, deserialize_with = "params::text")]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "params::opt")]
    pub actor_id: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub min_length: Option<i64>,
    #[serde(default, deserialize_with = "params::opt")]
    pub max_length: Option<i64>,
    #[serde(default, deserialize_with = "params::text")]
    pub sort_by: Option<String>,
    #[serde(default, deserialize_with = "params::text")]
    pub sort_direction: Option<String>,
    #[serde(default, deserialize_with = "params::opt")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "params::opt")]
    pub page_size: Option<u32>,
}

impl FilmQuery {
    fn filter(&self) -> WhereClause {
        let mut filter = WhereClause::new();
        filter
            .like_opt("f.title LIKE :title", ":title", self.title.as_deref())
            .push_opt(
                "EXISTS (SELECT 1 FROM film_category fc WHERE fc.film_id = f.film_id AND fc.category_id = :categoryId)",
                ":categoryId",
                self.category_id,
            )
            .push_opt(
                "EXISTS (SELECT 1 FROM film_actor fa WHERE fa.film_id = f.film_id AND fa.actor_id = :actorId)",
                ":actorId",
                self.actor_id,
            )
            .push_opt("CAST(f.release_year AS INTEGER) = :releaseYear", ":releaseYear", self.release_year)
            .push_opt("f.rating = :rating", ":rating", self.rating.clone())
            .push_opt("f.length >= :minLength", ":minLength", self.min_length)
            .push_opt("f.length <= :maxLength", ":maxLength", self.max_length);
        filter
    }
}

/// GET /films
pub async fn list_films(
    State(state): State<AppState>,
    Query(query): Query<FilmQuery>,
) -> ApiResult<Json<PageBody>> {
    let filter = query.filter();
    let order = OrderBy::resolve(
        query.sort_by.as_deref(),
        SORT_COLUMNS,
        "f.title",
        SortDirection::parse(query.sort_direction.as_deref(), SortDirection::Asc),
    );

    let sql = format!(
        "SELECT {FILM_COLUMNS} FROM film f JOIN language l ON f.language_id = l.language_id{}{}",
        filter.to_sql(),
        order.to_sql()
    );

    let pagination = Pagination::from_query(query.page, query.page_size, 10);

    state
        .db
        .call(move |session| -> ApiResult<Json<PageBody>> {
            let page = session
                .paginate(&sql, filter.params(), pagination)
                .context("Failed to load films")?;

            Ok(Json(page.into()))
        })
        .await
}

/// GET /films/{id}
pub async fn get_film(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Record>> {
    let film_id = parse_id(&raw_id, "film")?;
    let params = Params::new().bind(":filmId", film_id);

    state
        .db
        .call(move |session| -> ApiResult<Json<Record>> {
            let mut film = session
                .get(
                    &format!(
                        "SELECT {FILM_COLUMNS} FROM film f JOIN language l ON f.language_id = l.language_id WHERE f.film_id = :filmId"
                    ),
                    &params,
                )
                .context("Failed to load film")?
                .ok_or_else(|| ApiError::not_found("Film not found"))?;

            let categories = session
                .query(
                    r#"
                    SELECT c.category_id, c.name
                    FROM category c
                    JOIN film_category fc ON c.category_id = fc.category_id
                    WHERE fc.film_id = :filmId
                    ORDER BY c.name
                    "#,
                    &params,
                )
                .context("Failed to load film categories")?;

            let actors = session
                .query(
                    r#"
                    SELECT a.actor_id, a.first_name, a.last_name
                    FROM actor a
                    JOIN film_actor fa ON a.actor_id = fa.actor_id
                    WHERE fa.film_id = :filmId
                    ORDER BY a.last_name, a.first_name
                    "#,
                    &params,
                )
                .context("Failed to load film actors")?;

            film.insert(
                "categories".into(),
                Value::Array(categories.into_iter().map(Value::Object).collect()),
            );
            film.insert(
                "actors".into(),
                Value::Array(actors.into_iter().map(Value::Object).collect()),
            );

            Ok(Json(film))
        })
        .await
}
