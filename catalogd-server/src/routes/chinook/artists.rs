use axum::extract::{Path, Query, State};
use axum::Json;
use catalogd_core::{Params, ValidationError, WhereClause};
use serde::{Deserialize, Serialize};

use super::{IdQuery, ListQuery};
use crate::db::{Record, SqlExecutor};
use crate::envelope::{CatalogError, CatalogResult, Envelope, PagedItems};
use crate::error::DbContext;
use crate::ids::parse_id;
use crate::state::AppState;

const SORT_COLUMNS: &[(&str, &str)] = &[
    ("Name", "ar.Name"),
    ("ArtistId", "ar.ArtistId"),
    ("albumCount", "albumCount"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArtistBody {
    pub name: Option<String>,
}

impl ArtistBody {
    fn name(&self) -> Result<&str, ValidationError> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(ValidationError::MissingField { field: "Name" })
    }
}

fn load_artist<E: SqlExecutor>(db: &E, artist_id: i64) -> CatalogResult<Option<Record>> {
    Ok(db
        .get(
            "SELECT * FROM Artist WHERE ArtistId = :artistId",
            &Params::new().bind(":artistId", artist_id),
        )
        .context("Failed to load artist")?)
}

/// GET /artists
pub async fn list_artists(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> CatalogResult<Envelope<PagedItems<Record>>> {
    let mut filter = WhereClause::new();
    filter.like_opt("ar.Name LIKE :search", ":search", query.search.as_deref());
    let order = query.order(SORT_COLUMNS, "ar.Name");

    let sql = format!(
        r#"
        SELECT ar.ArtistId, ar.Name,
               (SELECT COUNT(*) FROM Album a WHERE a.ArtistId = ar.ArtistId) AS albumCount
        FROM Artist ar{}{}, ar.ArtistId
        "#,
        filter.to_sql(),
        order.to_sql()
    );

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<PagedItems<Record>>> {
            let page = session
                .paginate(&sql, filter.params(), query.pagination())
                .context("Failed to load artists")?;

            Ok(Envelope::ok(page.into()))
        })
        .await
}

/// POST /artists
pub async fn create_artist(
    State(state): State<AppState>,
    Json(body): Json<ArtistBody>,
) -> CatalogResult<Envelope<Option<Record>>> {
    let name = body.name()?.to_owned();

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Option<Record>>> {
            let artist_id = session
                .insert("Artist", &[("Name", name.into())])
                .context("Failed to create artist")?;
            tracing::info!(artist_id, "artist created");

            Ok(Envelope::created(
                load_artist(session, artist_id)?,
                "Artist created successfully",
            ))
        })
        .await
}

/// PUT /artists?id=
pub async fn update_artist(
    State(state): State<AppState>,
    Query(target): Query<IdQuery>,
    Json(body): Json<ArtistBody>,
) -> CatalogResult<Envelope<Option<Record>>> {
    let artist_id = target.require("Artist")?;
    let name = body.name()?.to_owned();

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Option<Record>>> {
            let changed = session
                .update("Artist", "ArtistId", artist_id, &[("Name", name.into())])
                .context("Failed to update artist")?;
            if changed == 0 {
                return Err(CatalogError::not_found("Artist not found"));
            }

            Ok(Envelope::ok(load_artist(session, artist_id)?)
                .with_message("Artist updated successfully"))
        })
        .await
}

/// DELETE /artists?id=
pub async fn delete_artist(
    State(state): State<AppState>,
    Query(target): Query<IdQuery>,
) -> CatalogResult<Envelope<()>> {
    let artist_id = target.require("Artist")?;

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<()>> {
            let albums = session
                .count(
                    "SELECT COUNT(*) FROM Album WHERE ArtistId = :artistId",
                    &Params::new().bind(":artistId", artist_id),
                )
                .context("Failed to check artist albums")?;
            if albums > 0 {
                return Err(CatalogError::bad_request(
                    "Cannot delete artist with existing albums",
                ));
            }

            let removed = session
                .delete("Artist", "ArtistId", artist_id)
                .context("Failed to delete artist")?;
            if removed == 0 {
                return Err(CatalogError::not_found("Artist not found"));
            }

            tracing::info!(artist_id, "artist deleted");
            Ok(Envelope::message("Artist deleted successfully"))
        })
        .await
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistStats {
    pub album_count: i64,
    pub track_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ArtistDetail {
    #[serde(flatten)]
    pub artist: Record,
    pub albums: Vec<Record>,
    pub stats: ArtistStats,
}

/// GET /artists/{id}
pub async fn get_artist(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> CatalogResult<Envelope<ArtistDetail>> {
    let artist_id = parse_id(&raw_id, "Artist")?;
    let params = Params::new().bind(":artistId", artist_id);

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<ArtistDetail>> {
            let artist = load_artist(session, artist_id)?
                .ok_or_else(|| CatalogError::not_found("Artist not found"))?;

            let albums = session
                .query(
                    "SELECT * FROM Album WHERE ArtistId = :artistId ORDER BY Title",
                    &params,
                )
                .context("Failed to load artist albums")?;

            let stats = session
                .get_as::<ArtistStats>(
                    r#"
                    SELECT COUNT(DISTINCT a.AlbumId) AS albumCount, COUNT(t.TrackId) AS trackCount
                    FROM Album a
                    LEFT JOIN Track t ON a.AlbumId = t.AlbumId
                    WHERE a.ArtistId = :artistId
                    "#,
                    &params,
                )
                .context("Failed to load artist stats")?
                .unwrap_or_default();

            Ok(Envelope::ok(ArtistDetail {
                artist,
                albums,
                stats,
            }))
        })
        .await
}

/// GET /artists/{id}/albums
pub async fn artist_albums(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> CatalogResult<Envelope<Vec<Record>>> {
    let artist_id = parse_id(&raw_id, "Artist")?;

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Vec<Record>>> {
            if load_artist(session, artist_id)?.is_none() {
                return Err(CatalogError::not_found("Artist not found"));
            }

            let albums = session
                .query(
                    r#"
                    SELECT a.AlbumId, a.Title, a.ArtistId, ar.Name AS artistName,
                           COUNT(t.TrackId) AS trackCount
                    FROM Album a
                    JOIN Artist ar ON a.ArtistId = ar.ArtistId
                    LEFT JOIN Track t ON a.AlbumId = t.AlbumId
                    WHERE a.ArtistId = :artistId
                    GROUP BY a.AlbumId
                    ORDER BY a.Title ASC
                    "#,
                    &Params::new().bind(":artistId", artist_id),
                )
                .context("Failed to load artist albums")?;

            Ok(Envelope::ok(albums))
        })
        .await
}
