use axum::extract::{Query, State};
use axum::Json;
use catalogd_core::{Params, ValidationError, WhereClause};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::IdQuery;
use crate::db::{Record, SqlExecutor};
use crate::envelope::{CatalogError, CatalogResult, Envelope};
use crate::error::DbContext;
use crate::params;
use crate::routes::pick_columns;
use crate::state::AppState;

/// Writable track columns, in insert order.
const TRACK_FIELDS: &[&str] = &[
    "Name",
    "AlbumId",
    "MediaTypeId",
    "GenreId",
    "Composer",
    "Milliseconds",
    "Bytes",
    "UnitPrice",
];

const REQUIRED_FIELDS: &[&str] = &[
    "Name",
    "AlbumId",
    "MediaTypeId",
    "GenreId",
    "Milliseconds",
    "UnitPrice",
];

fn load_track<E: SqlExecutor>(db: &E, track_id: i64) -> CatalogResult<Option<Record>> {
    Ok(db
        .get(
            "SELECT * FROM Track WHERE TrackId = :trackId",
            &Params::new().bind(":trackId", track_id),
        )
        .context("Failed to load track")?)
}

/// Present, non-null, and not zero or blank.
fn provided(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackQuery {
    #[serde(default, deserialize_with = "params::opt")]
    pub album_id: Option<i64>,
}

/// GET /tracks
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<TrackQuery>,
) -> CatalogResult<Envelope<Vec<Record>>> {
    let mut filter = WhereClause::new();
    filter.push_opt("AlbumId = :albumId", ":albumId", query.album_id);

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Vec<Record>>> {
            let tracks = session
                .query(
                    &format!("SELECT * FROM Track{} ORDER BY TrackId", filter.to_sql()),
                    filter.params(),
                )
                .context("Failed to load tracks")?;

            Ok(Envelope::ok(tracks))
        })
        .await
}

/// POST /tracks
pub async fn create_track(
    State(state): State<AppState>,
    Json(body): Json<Map<String, Value>>,
) -> CatalogResult<Envelope<Option<Record>>> {
    let checks: Vec<(&'static str, bool)> = REQUIRED_FIELDS
        .iter()
        .map(|field| (*field, provided(body.get(*field))))
        .collect();
    ValidationError::require(&checks)?;

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Option<Record>>> {
            let track_id = session
                .insert("Track", &pick_columns(&body, TRACK_FIELDS))
                .context("Failed to create track")?;
            tracing::info!(track_id, "track created");

            Ok(Envelope::created(
                load_track(session, track_id)?,
                "Track created successfully",
            ))
        })
        .await
}

/// PUT /tracks?id=
///
/// Writes only the whitelisted keys present in the body.
pub async fn update_track(
    State(state): State<AppState>,
    Query(target): Query<IdQuery>,
    Json(body): Json<Map<String, Value>>,
) -> CatalogResult<Envelope<Option<Record>>> {
    let track_id = target.require("Track")?;

    let changes = pick_columns(&body, TRACK_FIELDS);
    if changes.is_empty() {
        return Err(ValidationError::NothingToUpdate.into());
    }

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<Option<Record>>> {
            let changed = session
                .update("Track", "TrackId", track_id, &changes)
                .context("Failed to update track")?;
            if changed == 0 {
                return Err(CatalogError::not_found("Track not found"));
            }

            Ok(Envelope::ok(load_track(session, track_id)?)
                .with_message("Track updated successfully"))
        })
        .await
}

/// DELETE /tracks?id=
///
/// Sold tracks are kept; playlist entries go with the track.
pub async fn delete_track(
    State(state): State<AppState>,
    Query(target): Query<IdQuery>,
) -> CatalogResult<Envelope<()>> {
    let track_id = target.require("Track")?;
    let params = Params::new().bind(":trackId", track_id);

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<()>> {
            let sold = session
                .count(
                    "SELECT COUNT(*) FROM InvoiceLine WHERE TrackId = :trackId",
                    &params,
                )
                .context("Failed to check track sales")?;
            if sold > 0 {
                return Err(CatalogError::bad_request(
                    "Cannot delete track with existing invoice lines",
                ));
            }

            let removed = session.transaction(|tx| -> CatalogResult<usize> {
                tx.execute("DELETE FROM PlaylistTrack WHERE TrackId = :trackId", &params)
                    .context("Failed to remove track from playlists")?;
                Ok(tx
                    .delete("Track", "TrackId", track_id)
                    .context("Failed to delete track")?)
            })?;
            if removed == 0 {
                return Err(CatalogError::not_found("Track not found"));
            }

            tracing::info!(track_id, "track deleted");
            Ok(Envelope::message("Track deleted successfully"))
        })
        .await
}

#[cfg(test)]
mod tests {
    use crate::test_support::{chinook_app, get_json, send_json};
    use axum::http::StatusCode;
    use serde_json::json;

    fn new_track() -> serde_json::Value {
        json!({
            "Name": "Walk This Way",
            "AlbumId": 3,
            "MediaTypeId": 1,
            "GenreId": 1,
            "Milliseconds": 220000,
            "UnitPrice": 0.99,
            "Ignored": "x"
        })
    }

    #[tokio::test]
    async fn lists_tracks_by_album() {
        let app = chinook_app();
        let (_, body) = get_json(&app, "/chinook/api/tracks").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 4);

        let (_, body) = get_json(&app, "/chinook/api/tracks?albumId=1").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, body) = get_json(&app, "/chinook/api/tracks?albumId=").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn create_requires_core_fields() {
        let app = chinook_app();
        let (status, body) =
            send_json(&app, "POST", "/chinook/api/tracks", json!({"Name": "X", "AlbumId": 1})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Missing required fields: MediaTypeId, GenreId, Milliseconds, UnitPrice"
        );

        let (status, body) = send_json(&app, "POST", "/chinook/api/tracks", new_track()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["TrackId"], 5);
        assert_eq!(body["data"]["Composer"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn partial_update() {
        let app = chinook_app();
        let (status, body) = send_json(
            &app,
            "PUT",
            "/chinook/api/tracks?id=4",
            json!({"Composer": "U. Dirkschneider", "Bogus": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["Composer"], "U. Dirkschneider");
        assert_eq!(body["data"]["Name"], "Balls to the Wall");

        let (status, _) =
            send_json(&app, "PUT", "/chinook/api/tracks?id=4", json!({"Bogus": 1})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send_json(&app, "PUT", "/chinook/api/tracks?id=77", json!({"Name": "Y"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_track() {
        let app = chinook_app();
        let (status, _) = send_json(&app, "DELETE", "/chinook/api/tracks?id=1", json!(null)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send_json(&app, "DELETE", "/chinook/api/tracks?id=4", json!(null)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send_json(&app, "DELETE", "/chinook/api/tracks?id=4", json!(null)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            send_json(&app, "DELETE", "/chinook/api/tracks?id=abc", json!(null)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid Track ID");
    }
}
