//! Health check route

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::Extension, Json};
use serde::Serialize;

use crate::db::Database;

/// Server start time for uptime calculation, plus the mounted databases.
#[derive(Debug)]
pub struct ServerState {
    pub sakila: Option<Database>,
    pub chinook: Option<Database>,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(sakila: Option<Database>, chinook: Option<Database>) -> Self {
        Self {
            sakila,
            chinook,
            start_time: Instant::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub path: String,
    pub size_bytes: Option<u64>,
}

impl From<&Database> for DatabaseHealth {
    fn from(db: &Database) -> Self {
        Self {
            path: db.path().display().to_string(),
            size_bytes: db.size_bytes(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Databases {
    pub sakila: Option<DatabaseHealth>,
    pub chinook: Option<DatabaseHealth>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub databases: Databases,
}

/// GET /health
pub async fn health_check(Extension(state): Extension<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        databases: Databases {
            sakila: state.sakila.as_ref().map(DatabaseHealth::from),
            chinook: state.chinook.as_ref().map(DatabaseHealth::from),
        },
    })
}
