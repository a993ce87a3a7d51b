use axum::extract::{Path, Query, State};
use axum::Json;
use catalogd_core::{Params, ValidationError, WhereClause};
use serde::Deserialize;

use crate::db::{Record, SqlExecutor};
use crate::envelope::{CatalogError, CatalogResult, Envelope};
use crate::error::{ApiError, DbContext};
use crate::ids::parse_id;
use crate::params;
use crate::state::AppState;

const GENRE_SELECT: &str = r#"
    SELECT g.GenreId, g.Name,
           (SELECT COUNT(*) FROM Track t WHERE t.GenreId = g.GenreId) AS TrackCount
    FROM Genre g
"#;

#[derive(Debug, Default, Deserialize)]
pub struct GenreQuery {
    #[serde(default, deserialize_with = "params::text")]
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenreBody {
    pub name: Option<String>,
}

fn load_genre<E: SqlExecutor>(db: &E, genre_id: i64) -> CatalogResult<Option<Record>> {
    Ok(db
        .get(
            &format!("{GENRE_SELECT} WHERE g.GenreId = :genreId"),
            &Params::new().bind(":genreId", genre_id),
        )
        .context("Failed to load genre")?)
}

/// GET /genres
pub async fn list_genres(
    State(state): State<AppState>,
    Query(query): Query<GenreQuery>,
) -> CatalogResult<Envelope<Vec<Record>>> {
    let mut filter = WhereClause::new();
    filter.like_opt("g.Name LIKE :search", ":search", query.search.as_deref());

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Vec<Record>>> {
            let genres = session
                .query(
                    &format!("{GENRE_SELECT}{} ORDER BY g.Name", filter.to_sql()),
                    filter.params(),
                )
                .context("Failed to load genres")?;

            Ok(Envelope::ok(genres))
        })
        .await
}

/// GET /genres/{id}
pub async fn get_genre(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> CatalogResult<Envelope<Record>> {
    let genre_id = parse_id(&raw_id, "Genre")?;

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Record>> {
            load_genre(session, genre_id)?
                .map(Envelope::ok)
                .ok_or_else(|| CatalogError::not_found("Genre not found"))
        })
        .await
}

/// POST /genres
///
/// Names are unique, compared case-insensitively.
pub async fn create_genre(
    State(state): State<AppState>,
    Json(body): Json<GenreBody>,
) -> CatalogResult<Envelope<Option<Record>>> {
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ValidationError::MissingField { field: "Name" })?
        .to_owned();

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Option<Record>>> {
            let genre_id = session.transaction(|tx| -> CatalogResult<i64> {
                let existing = tx
                    .count(
                        "SELECT COUNT(*) FROM Genre WHERE lower(Name) = lower(:name)",
                        &Params::new().bind(":name", name.as_str()),
                    )
                    .context("Failed to check genre name")?;
                if existing > 0 {
                    return Err(ApiError::Conflict(format!("Genre '{name}' already exists")).into());
                }

                Ok(tx
                    .insert("Genre", &[("Name", name.as_str().into())])
                    .context("Failed to create genre")?)
            })?;
            tracing::info!(genre_id, "genre created");

            Ok(Envelope::created(
                load_genre(session, genre_id)?,
                "Genre created successfully",
            ))
        })
        .await
}

/// DELETE /genres/{id}
pub async fn delete_genre(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> CatalogResult<Envelope<()>> {
    let genre_id = parse_id(&raw_id, "Genre")?;

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<()>> {
            let genre = load_genre(session, genre_id)?
                .ok_or_else(|| CatalogError::not_found("Genre not found"))?;

            if genre.get("TrackCount").and_then(|v| v.as_i64()).unwrap_or(0) > 0 {
                return Err(CatalogError::bad_request(
                    "Cannot delete genre with existing tracks",
                ));
            }

            session
                .delete("Genre", "GenreId", genre_id)
                .context("Failed to delete genre")?;

            tracing::info!(genre_id, "genre deleted");
            Ok(Envelope::message("Genre deleted successfully"))
        })
        .await
}
