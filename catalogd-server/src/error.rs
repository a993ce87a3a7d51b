//! API error types with IntoResponse
//!
//! The rental dashboard renders errors as `{"error", "details"?}`. The music
//! catalog wraps the same errors in its envelope (see [`crate::envelope`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalogd_core::ValidationError;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::db::DbError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Rejected input (400)
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Request conflicts with current data (400), e.g. renting a rented copy
    #[error("{message}")]
    BadRequest { message: String, fields: Map<String, Value> },

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Unique constraint on user input (409)
    #[error("{0}")]
    Conflict(String),

    /// Database failure (500, logged)
    #[error("{context}")]
    Database {
        context: &'static str,
        #[source]
        source: DbError,
    },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Attach an extra top-level field to a 400 body.
    pub fn with_field(self, key: &str, value: impl Into<Value>) -> Self {
        match self {
            Self::BadRequest { message, mut fields } => {
                fields.insert(key.to_string(), value.into());
                Self::BadRequest { message, fields }
            }
            other => other,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn database(context: &'static str, source: DbError) -> Self {
        match source {
            DbError::NotFound { resource, id } => {
                Self::NotFound(format!("{resource} {id} not found"))
            }
            source => Self::Database { context, source },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Underlying cause exposed to clients as `details`.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::Database { source, .. } => Some(source.to_string()),
            _ => None,
        }
    }

    pub(crate) fn log(&self) {
        if let Self::Database { context, source } = self {
            tracing::error!(error = %source, "{context}");
        }
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        Self::database("Database operation failed", e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let mut body = json!({ "error": self.to_string() });
        if let Some(details) = self.details() {
            body["details"] = Value::String(details);
        }
        if let Self::BadRequest { fields, .. } = &self {
            if let Value::Object(map) = &mut body {
                map.extend(fields.clone());
            }
        }

        (self.status(), Json(body)).into_response()
    }
}

/// Attach a client-facing message to data-access failures.
pub trait DbContext<T> {
    fn context(self, context: &'static str) -> ApiResult<T>;
}

impl<T> DbContext<T> for Result<T, DbError> {
    fn context(self, context: &'static str) -> ApiResult<T> {
        self.map_err(|e| ApiError::database(context, e))
    }
}
