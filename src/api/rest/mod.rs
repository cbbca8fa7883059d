//! REST API module for HTTP endpoints
//!
//! - `GET/POST /api/books`, `GET /api/books/count`, `POST /api/books/bulk`
//! - `GET/PATCH/DELETE /api/books/:id`, `GET /api/books/:id/history`
//! - `GET /api/cqrs`, `POST /api/cqrs/toggle`
//! - `GET /api/state-changes/count`, `POST /api/replay`, `DELETE /api/store`

pub mod books;
pub mod cqrs;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::catalog::Catalog;
use crate::error::{CatalogError, CatalogResult};
use crate::types::default_user;

/// Common pagination parameters
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    /// Maximum number of items to return (default: 100, max: 1000)
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Number of items to skip
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

impl PaginationParams {
    /// Normalize limit to max 1000
    pub fn normalized_limit(&self) -> usize {
        self.limit.min(1000)
    }
}

/// Acting user for commands without a body
#[derive(Debug, Deserialize)]
pub struct UserParams {
    #[serde(default = "default_user")]
    pub user: String,
}

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Current notification sequence ID, for pairing with the WebSocket stream
    pub sequence_id: u64,
    /// Total count (for paginated responses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, sequence_id: u64) -> Self {
        Self {
            data,
            sequence_id,
            total: None,
        }
    }

    pub fn with_total(data: T, sequence_id: u64, total: usize) -> Self {
        Self {
            data,
            sequence_id,
            total: Some(total),
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: message.into(),
            code: code.to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        let message = e.to_string();
        match e {
            CatalogError::NotFound(_) => Self::not_found(message),
            CatalogError::NoOpUpdate(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "NO_OP_UPDATE", message)
            }
            CatalogError::InvalidAttributes(_) => Self::bad_request(message),
            CatalogError::CorruptHistory(_) => {
                Self::new(StatusCode::CONFLICT, "CORRUPT_HISTORY", message)
            }
            CatalogError::PersistenceFailure(_) | CatalogError::Store(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "PERSISTENCE_FAILURE", message)
            }
            CatalogError::RebuildFailed(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "REBUILD_FAILED", message)
            }
            CatalogError::Join(_) => Self::internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = %self.code, error = %self.error, "Request failed");
        }
        (self.status, Json(self)).into_response()
    }
}

/// Run a catalog call on the blocking pool
///
/// Catalog calls touch the file-backed log and take blocking locks.
pub async fn run_blocking<T, F>(catalog: &Arc<Catalog>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Catalog) -> CatalogResult<T> + Send + 'static,
{
    let catalog = Arc::clone(catalog);
    let result = tokio::task::spawn_blocking(move || f(&catalog))
        .await
        .map_err(CatalogError::from)?;
    Ok(result?)
}
