//! Book endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{run_blocking, ApiError, ApiResponse, PaginationParams, UserParams};
use crate::api::state::AppState;
use crate::catalog::BulkReport;
use crate::types::{default_user, Attributes, MaterializedEntity, StateChangeRecord};

/// Body of `POST /api/books`
#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    pub attributes: Attributes,
    #[serde(default = "default_user")]
    pub user: String,
}

/// Body of `PATCH /api/books/:id`
#[derive(Debug, Deserialize)]
pub struct UpdateBookRequest {
    pub changes: Attributes,
    #[serde(default = "default_user")]
    pub user: String,
}

/// Body of `POST /api/books/bulk`
#[derive(Debug, Deserialize)]
pub struct BulkCreateRequest {
    pub items: Vec<Attributes>,
    #[serde(default = "default_user")]
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedBook {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct DeletedBook {
    pub id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct BookCount {
    pub count: usize,
}

/// GET /api/books - List books ordered by id
pub async fn list_books(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<Vec<MaterializedEntity>>>, ApiError> {
    let (offset, limit) = (params.offset, params.normalized_limit());
    let page = run_blocking(&state.catalog, move |c| c.list_books(offset, limit)).await?;

    Ok(Json(ApiResponse::with_total(
        page.items,
        state.current_sequence_id(),
        page.total,
    )))
}

/// GET /api/books/count - Number of live books
pub async fn count_books(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<BookCount>>, ApiError> {
    let limit = state.catalog.config().count_timeout;
    let count = tokio::time::timeout(limit, run_blocking(&state.catalog, |c| c.count_books()))
        .await
        .map_err(|_| {
            ApiError::timeout(format!("count did not finish within {}s", limit.as_secs()))
        })??;

    Ok(Json(ApiResponse::new(
        BookCount { count },
        state.current_sequence_id(),
    )))
}

/// GET /api/books/:id
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MaterializedEntity>>, ApiError> {
    let lookup = id.clone();
    let book = run_blocking(&state.catalog, move |c| c.get_book(&lookup))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Book '{}' not found", id)))?;

    Ok(Json(ApiResponse::new(book, state.current_sequence_id())))
}

/// POST /api/books
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateBookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = run_blocking(&state.catalog, move |c| {
        c.create(request.attributes, &request.user)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(CreatedBook { id }, state.current_sequence_id())),
    ))
}

/// PATCH /api/books/:id
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateBookRequest>,
) -> Result<Json<ApiResponse<StateChangeRecord>>, ApiError> {
    let record = run_blocking(&state.catalog, move |c| {
        c.update(&id, request.changes, &request.user)
    })
    .await?;

    Ok(Json(ApiResponse::new(record, state.current_sequence_id())))
}

/// DELETE /api/books/:id?user=
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<UserParams>,
) -> Result<Json<ApiResponse<DeletedBook>>, ApiError> {
    let id = run_blocking(&state.catalog, move |c| c.delete(&id, &params.user)).await?;

    Ok(Json(ApiResponse::new(
        DeletedBook { id, deleted: true },
        state.current_sequence_id(),
    )))
}

/// GET /api/books/:id/history - State-change records in fold order
pub async fn book_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<StateChangeRecord>>>, ApiError> {
    let lookup = id.clone();
    let history = run_blocking(&state.catalog, move |c| c.history(&lookup)).await?;
    if history.is_empty() {
        return Err(ApiError::not_found(format!("Book '{}' has no history", id)));
    }

    let total = history.len();
    Ok(Json(ApiResponse::with_total(
        history,
        state.current_sequence_id(),
        total,
    )))
}

/// POST /api/books/bulk
pub async fn bulk_create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkCreateRequest>,
) -> Result<Json<ApiResponse<BulkReport>>, ApiError> {
    let report = run_blocking(&state.catalog, move |c| {
        c.bulk_create(request.items, &request.user)
    })
    .await?;

    Ok(Json(ApiResponse::new(report, state.current_sequence_id())))
}
