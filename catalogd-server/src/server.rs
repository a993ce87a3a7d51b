//! Main server module - Axum setup and router configuration
//!
//! Mounts the rental dashboard under `/sakila/api` and the music catalog
//! under `/chinook/api`, each with its own database. Either can be left
//! out by not configuring its file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Extension, Router};
use catalogd_core::{CatalogConfig, Clock, ServerSettings};
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::db::{schema, Database};
use crate::routes::{self, health::ServerState};
use crate::state::AppState;

/// Everything `serve` needs.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub settings: ServerSettings,
    pub sakila: Option<PathBuf>,
    pub chinook: Option<PathBuf>,
    /// Create missing database files and apply the bundled DDL
    pub init_schema: bool,
}

impl From<CatalogConfig> for ServeOptions {
    fn from(config: CatalogConfig) -> Self {
        Self {
            settings: config.server,
            sakila: config.databases.sakila,
            chinook: config.databases.chinook,
            init_schema: false,
        }
    }
}

fn open_database(path: &Path, ddl: &str, init_schema: bool) -> anyhow::Result<Database> {
    let db = if init_schema {
        Database::create(path, ddl)
    } else {
        Database::open(path)
    };
    db.with_context(|| format!("Failed to open database {}", path.display()))
}

/// Open the configured databases; at least one is required.
pub fn open_databases(opts: &ServeOptions) -> anyhow::Result<(Option<Database>, Option<Database>)> {
    let sakila = opts
        .sakila
        .as_deref()
        .map(|path| open_database(path, schema::SAKILA, opts.init_schema))
        .transpose()?;
    let chinook = opts
        .chinook
        .as_deref()
        .map(|path| open_database(path, schema::CHINOOK, opts.init_schema))
        .transpose()?;

    if sakila.is_none() && chinook.is_none() {
        bail!("No database configured: set a sakila or chinook path");
    }
    Ok((sakila, chinook))
}

/// Run the server until Ctrl+C or SIGTERM.
pub async fn run_server(opts: ServeOptions) -> anyhow::Result<()> {
    let (sakila, chinook) = open_databases(&opts)?;
    if let Some(db) = &sakila {
        info!("Rental dashboard database: {}", db.path().display());
    }
    if let Some(db) = &chinook {
        info!("Music catalog database: {}", db.path().display());
    }

    let app = create_router(sakila, chinook, Clock::System, &opts.settings);

    let listener = TcpListener::bind(opts.settings.bind)
        .await
        .with_context(|| format!("Failed to bind {}", opts.settings.bind))?;
    info!("Starting catalogd on http://{}", opts.settings.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn cors_layer(permissive: bool) -> CorsLayer {
    let origins = if permissive {
        AllowOrigin::any()
    } else {
        AllowOrigin::predicate(|origin: &HeaderValue, _| is_local_origin(origin))
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

fn is_local_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    ["http://localhost", "http://127.0.0.1"].iter().any(|prefix| {
        origin
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    })
}

/// Create the Axum router with all routes
pub fn create_router(
    sakila: Option<Database>,
    chinook: Option<Database>,
    clock: Clock,
    settings: &ServerSettings,
) -> Router {
    let state = Arc::new(ServerState::new(sakila.clone(), chinook.clone()));

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(settings.timeout_secs)))
        .layer(cors_layer(settings.cors_permissive));

    let mut router = Router::new().route("/health", get(routes::health::health_check));
    if let Some(db) = sakila {
        router = router.nest(
            "/sakila/api",
            routes::sakila::router(AppState::new(db, clock)),
        );
    }
    if let Some(db) = chinook {
        router = router.nest(
            "/chinook/api",
            routes::chinook::router(AppState::new(db, clock)),
        );
    }

    router.layer(Extension(state)).layer(middleware)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn memory(ddl: &str) -> Option<Database> {
        Some(Database::open_in_memory(ddl).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(
            memory(schema::SAKILA),
            None,
            Clock::System,
            &ServerSettings::default(),
        );

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["databases"]["sakila"]["path"], ":memory:");
        assert_eq!(body["databases"]["chinook"], Value::Null);
    }

    #[tokio::test]
    async fn test_apps_are_nested() {
        let app = create_router(
            memory(schema::SAKILA),
            memory(schema::CHINOOK),
            Clock::System,
            &ServerSettings::default(),
        );

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/sakila/api/categories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/chinook/api/artists").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unconfigured_app_is_not_mounted() {
        let app = create_router(
            None,
            memory(schema::CHINOOK),
            Clock::System,
            &ServerSettings::default(),
        );

        let response = app
            .oneshot(Request::builder().uri("/sakila/api/films").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_queued_on_a_busy_database_times_out() {
        let db = Database::open_in_memory(schema::SAKILA).unwrap();
        let settings = ServerSettings {
            timeout_secs: 1,
            ..Default::default()
        };
        let app = create_router(Some(db.clone()), None, Clock::System, &settings);

        // another request is holding the connection
        let held = db.session().unwrap();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/sakila/api/categories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        drop(held);
        let response = app
            .oneshot(Request::builder().uri("/sakila/api/categories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_allows_localhost_only() {
        let app = create_router(
            memory(schema::SAKILA),
            None,
            Clock::System,
            &ServerSettings::default(),
        );

        let preflight = |origin: &str| {
            Request::builder()
                .method("OPTIONS")
                .uri("/sakila/api/films")
                .header("origin", origin)
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(preflight("http://localhost:3000")).await.unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );

        let response = app.oneshot(preflight("https://evil.example")).await.unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn local_origin_matching() {
        let check = |s: &str| is_local_origin(&HeaderValue::from_str(s).unwrap());
        assert!(check("http://localhost"));
        assert!(check("http://127.0.0.1:5173"));
        assert!(!check("http://localhost.evil.com"));
        assert!(!check("https://example.com"));
    }

    #[test]
    fn test_open_databases() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ServeOptions {
            sakila: Some(dir.path().join("missing.db")),
            ..Default::default()
        };
        assert!(open_databases(&missing).is_err());

        let created = ServeOptions {
            chinook: Some(dir.path().join("chinook.db")),
            init_schema: true,
            ..Default::default()
        };
        let (sakila, chinook) = open_databases(&created).unwrap();
        assert!(sakila.is_none());
        assert!(chinook.is_some());
        assert!(dir.path().join("chinook.db").exists());

        assert!(open_databases(&ServeOptions::default()).is_err());
    }
}
