//! `{success, data, message}` envelope used by every music catalog route.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalogd_core::{Page, ValidationError};
use serde::Serialize;
use serde_json::json;

use crate::db::DbError;
use crate::error::ApiError;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            status: StatusCode::OK,
        }
    }

    /// 201 with a confirmation message.
    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data).with_message(message)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope<()> {
    /// Success with no payload.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            status: StatusCode::OK,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (self.status, Json(&self)).into_response()
    }
}

/// Paginated list payload: `{items, total, page, limit, totalPages}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedItems<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> From<Page<T>> for PagedItems<T> {
    fn from(page: Page<T>) -> Self {
        let total_pages = page.total_pages();
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            limit: page.page_size,
            total_pages,
        }
    }
}

/// [`ApiError`] rendered as `{success: false, error}`.
#[derive(Debug)]
pub struct CatalogError(pub ApiError);

impl From<ApiError> for CatalogError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<ValidationError> for CatalogError {
    fn from(e: ValidationError) -> Self {
        Self(e.into())
    }
}

impl From<DbError> for CatalogError {
    fn from(e: DbError) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        self.0.log();
        let body = json!({ "success": false, "error": self.0.to_string() });
        (self.0.status(), Json(body)).into_response()
    }
}

impl CatalogError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self(ApiError::not_found(message))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(ApiError::bad_request(message))
    }
}
