//! Music catalog API, mounted under `/chinook/api`.
//!
//! Every handler answers with an [`Envelope`](crate::envelope::Envelope).
//! Updates and deletes on the collection paths take the target as `?id=`.

pub mod albums;
pub mod artists;
pub mod genres;
pub mod stats;
pub mod tracks;

use axum::routing::get;
use axum::Router;
use catalogd_core::{OrderBy, Pagination, SortDirection, ValidationError};
use serde::Deserialize;

use crate::ids::require_query_id;
use crate::params;
use crate::state::AppState;

/// `page`, `limit`, `search` and sorting, shared by the paginated lists.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default, deserialize_with = "params::opt")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "params::opt")]
    pub limit: Option<u32>,
    #[serde(default, deserialize_with = "params::text")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "params::text")]
    pub sort_by: Option<String>,
    #[serde(default, deserialize_with = "params::text")]
    pub sort_order: Option<String>,
    #[serde(default, deserialize_with = "params::opt")]
    pub artist_id: Option<i64>,
}

impl ListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_query(self.page, self.limit, 10)
    }

    pub fn order(&self, allowed: &[(&str, &'static str)], default: &'static str) -> OrderBy {
        OrderBy::resolve(
            self.sort_by.as_deref(),
            allowed,
            default,
            SortDirection::parse(self.sort_order.as_deref(), SortDirection::Asc),
        )
    }
}

/// `?id=` target of PUT and DELETE.
#[derive(Debug, Default, Deserialize)]
pub struct IdQuery {
    #[serde(default)]
    pub id: Option<String>,
}

impl IdQuery {
    pub fn require(&self, resource: &'static str) -> Result<i64, ValidationError> {
        require_query_id(self.id.as_deref(), resource)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/artists",
            get(artists::list_artists)
                .post(artists::create_artist)
                .put(artists::update_artist)
                .delete(artists::delete_artist),
        )
        .route("/artists/{id}", get(artists::get_artist))
        .route("/artists/{id}/albums", get(artists::artist_albums))
        .route(
            "/albums",
            get(albums::list_albums)
                .post(albums::create_album)
                .put(albums::update_album)
                .delete(albums::delete_album),
        )
        .route("/albums/{id}", get(albums::get_album))
        .route("/albums/{id}/tracks", get(albums::album_tracks))
        .route(
            "/tracks",
            get(tracks::list_tracks)
                .post(tracks::create_track)
                .put(tracks::update_track)
                .delete(tracks::delete_track),
        )
        .route(
            "/genres",
            get(genres::list_genres).post(genres::create_genre),
        )
        .route(
            "/genres/{id}",
            get(genres::get_genre).delete(genres::delete_genre),
        )
        .route("/stats", get(stats::catalog_stats))
        .with_state(state)
}
