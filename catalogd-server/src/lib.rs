//! catalogd-server: HTTP JSON APIs over two SQLite files
//!
//! - `/sakila/api`: DVD rental dashboard (films, customers, rentals,
//!   inventory, payments, dashboard statistics)
//! - `/chinook/api`: music catalog (artists, albums, tracks, genres, stats)

pub mod db;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod params;
pub mod routes;
pub mod server;
pub mod state;

#[cfg(test)]
mod test_support;

pub use db::{Database, DbError};
pub use error::{ApiError, ApiResult};
pub use server::{create_router, run_server, ServeOptions};
pub use state::AppState;
