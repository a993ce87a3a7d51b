use axum::extract::{Path, Query, State};
use axum::Json;
use catalogd_core::{Params, SqlValue, ValidationError, WhereClause};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{IdQuery, ListQuery};
use crate::db::{Record, SqlExecutor};
use crate::envelope::{CatalogError, CatalogResult, Envelope, PagedItems};
use crate::error::DbContext;
use crate::ids::parse_id;
use crate::state::AppState;

const SORT_COLUMNS: &[(&str, &str)] = &[
    ("Title", "a.Title"),
    ("AlbumId", "a.AlbumId"),
    ("ArtistName", "ArtistName"),
    ("TrackCount", "TrackCount"),
    ("TotalDuration", "TotalDuration"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlbumBody {
    pub title: Option<String>,
    pub artist_id: Option<i64>,
}

impl AlbumBody {
    fn title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    fn artist_id(&self) -> Option<i64> {
        self.artist_id.filter(|id| *id != 0)
    }
}

fn load_album<E: SqlExecutor>(db: &E, album_id: i64) -> CatalogResult<Option<Record>> {
    Ok(db
        .get(
            "SELECT * FROM Album WHERE AlbumId = :albumId",
            &Params::new().bind(":albumId", album_id),
        )
        .context("Failed to load album")?)
}

/// GET /albums
pub async fn list_albums(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> CatalogResult<Envelope<PagedItems<Record>>> {
    let mut filter = WhereClause::new();
    filter
        .like_opt("a.Title LIKE :search", ":search", query.search.as_deref())
        .push_opt("a.ArtistId = :artistId", ":artistId", query.artist_id);
    let order = query.order(SORT_COLUMNS, "a.Title");

    let sql = format!(
        r#"
        SELECT a.AlbumId, a.Title, a.ArtistId,
               ar.Name AS ArtistName,
               COUNT(t.TrackId) AS TrackCount,
               SUM(t.Milliseconds) AS TotalDuration
        FROM Album a
        LEFT JOIN Artist ar ON a.ArtistId = ar.ArtistId
        LEFT JOIN Track t ON a.AlbumId = t.AlbumId{}
        GROUP BY a.AlbumId{}, a.AlbumId
        "#,
        filter.to_sql(),
        order.to_sql()
    );

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<PagedItems<Record>>> {
            let page = session
                .paginate(&sql, filter.params(), query.pagination())
                .context("Failed to load albums")?;

            Ok(Envelope::ok(page.into()))
        })
        .await
}

/// POST /albums
pub async fn create_album(
    State(state): State<AppState>,
    Json(body): Json<AlbumBody>,
) -> CatalogResult<Envelope<Option<Record>>> {
    ValidationError::require(&[
        ("Title", body.title().is_some()),
        ("ArtistId", body.artist_id().is_some()),
    ])?;

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Option<Record>>> {
            let album_id = session
                .insert(
                    "Album",
                    &[
                        ("Title", body.title().into()),
                        ("ArtistId", body.artist_id().into()),
                    ],
                )
                .context("Failed to create album")?;
            tracing::info!(album_id, "album created");

            Ok(Envelope::created(
                load_album(session, album_id)?,
                "Album created successfully",
            ))
        })
        .await
}

/// PUT /albums?id=
pub async fn update_album(
    State(state): State<AppState>,
    Query(target): Query<IdQuery>,
    Json(body): Json<AlbumBody>,
) -> CatalogResult<Envelope<Option<Record>>> {
    let album_id = target.require("Album")?;

    let mut changes: Vec<(&'static str, SqlValue)> = Vec::new();
    if let Some(title) = body.title() {
        changes.push(("Title", title.into()));
    }
    if let Some(artist_id) = body.artist_id() {
        changes.push(("ArtistId", artist_id.into()));
    }
    if changes.is_empty() {
        return Err(ValidationError::NothingToUpdate.into());
    }

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Option<Record>>> {
            let changed = session
                .update("Album", "AlbumId", album_id, &changes)
                .context("Failed to update album")?;
            if changed == 0 {
                return Err(CatalogError::not_found("Album not found"));
            }

            Ok(Envelope::ok(load_album(session, album_id)?)
                .with_message("Album updated successfully"))
        })
        .await
}

/// DELETE /albums?id=
///
/// Albums that still hold tracks are kept.
pub async fn delete_album(
    State(state): State<AppState>,
    Query(target): Query<IdQuery>,
) -> CatalogResult<Envelope<()>> {
    let album_id = target.require("Album")?;

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<()>> {
            let tracks = session
                .count(
                    "SELECT COUNT(*) FROM Track WHERE AlbumId = :albumId",
                    &Params::new().bind(":albumId", album_id),
                )
                .context("Failed to check album tracks")?;
            if tracks > 0 {
                return Err(CatalogError::bad_request(
                    "Cannot delete album with existing tracks",
                ));
            }

            let removed = session
                .delete("Album", "AlbumId", album_id)
                .context("Failed to delete album")?;
            if removed == 0 {
                return Err(CatalogError::not_found("Album not found"));
            }

            tracing::info!(album_id, "album deleted");
            Ok(Envelope::message("Album deleted successfully"))
        })
        .await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumDetail {
    #[serde(flatten)]
    pub album: Record,
    pub tracks: Vec<Record>,
    pub other_albums: Vec<Record>,
}

/// GET /albums/{id}
pub async fn get_album(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> CatalogResult<Envelope<AlbumDetail>> {
    let album_id = parse_id(&raw_id, "Album")?;
    let params = Params::new().bind(":albumId", album_id);

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<AlbumDetail>> {
            let album = session
                .get(
                    r#"
                    SELECT a.AlbumId, a.Title, a.ArtistId,
                           ar.Name AS ArtistName,
                           COUNT(t.TrackId) AS TrackCount,
                           SUM(t.Milliseconds) AS TotalDuration,
                           SUM(t.UnitPrice) AS TotalPrice
                    FROM Album a
                    LEFT JOIN Artist ar ON a.ArtistId = ar.ArtistId
                    LEFT JOIN Track t ON a.AlbumId = t.AlbumId
                    WHERE a.AlbumId = :albumId
                    GROUP BY a.AlbumId
                    "#,
                    &params,
                )
                .context("Failed to load album")?
                .ok_or_else(|| CatalogError::not_found("Album not found"))?;

            let tracks = session
                .query(
                    r#"
                    SELECT t.*, g.Name AS GenreName, m.Name AS MediaTypeName
                    FROM Track t
                    LEFT JOIN Genre g ON t.GenreId = g.GenreId
                    LEFT JOIN MediaType m ON t.MediaTypeId = m.MediaTypeId
                    WHERE t.AlbumId = :albumId
                    ORDER BY t.TrackId
                    "#,
                    &params,
                )
                .context("Failed to load album tracks")?;

            let other_albums = session
                .query(
                    r#"
                    SELECT * FROM Album
                    WHERE ArtistId = :artistId AND AlbumId != :albumId
                    ORDER BY AlbumId
                    LIMIT 5
                    "#,
                    &params
                        .clone()
                        .bind(":artistId", album.get("ArtistId").and_then(Value::as_i64)),
                )
                .context("Failed to load other albums")?;

            Ok(Envelope::ok(AlbumDetail {
                album,
                tracks,
                other_albums,
            }))
        })
        .await
}

/// GET /albums/{id}/tracks
pub async fn album_tracks(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> CatalogResult<Envelope<Vec<Record>>> {
    let album_id = parse_id(&raw_id, "Album")?;

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Vec<Record>>> {
            if load_album(session, album_id)?.is_none() {
                return Err(CatalogError::not_found("Album not found"));
            }

            let tracks = session
                .query(
                    r#"
                    SELECT t.TrackId, t.Name, t.AlbumId, t.MediaTypeId, t.GenreId, t.Composer,
                           t.Milliseconds, t.Bytes, t.UnitPrice, g.Name AS genreName
                    FROM Track t
                    LEFT JOIN Genre g ON t.GenreId = g.GenreId
                    WHERE t.AlbumId = :albumId
                    ORDER BY t.TrackId ASC
                    "#,
                    &Params::new().bind(":albumId", album_id),
                )
                .context("Failed to load album tracks")?;

            Ok(Envelope::ok(tracks))
        })
        .await
}
