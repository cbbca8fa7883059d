//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::rest::{books, cqrs};
use super::state::AppState;
use super::websocket::ws_handler;

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/api/books", get(books::list_books).post(books::create_book))
        .route("/api/books/count", get(books::count_books))
        .route("/api/books/bulk", post(books::bulk_create))
        .route(
            "/api/books/:id",
            get(books::get_book)
                .patch(books::update_book)
                .delete(books::delete_book),
        )
        .route("/api/books/:id/history", get(books::book_history))
        .route("/api/cqrs", get(cqrs::get_status))
        .route("/api/cqrs/toggle", post(cqrs::toggle))
        .route("/api/state-changes/count", get(cqrs::count_state_changes))
        .route("/api/replay", post(cqrs::replay))
        .route("/api/store", delete(cqrs::purge))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
