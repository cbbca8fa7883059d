//! CQRS flag, rebuild and administration endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::{error, info};

use super::{run_blocking, ApiError, ApiResponse};
use crate::api::state::AppState;
use crate::catalog::RebuildHandle;
use crate::cqrs::CqrsMode;
use crate::types::StateChangeCounts;

#[derive(Debug, Serialize)]
pub struct CqrsStatus {
    pub enabled: bool,
    pub mode: CqrsMode,
}

#[derive(Debug, Serialize)]
pub struct RebuildAccepted {
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct Purged {
    pub removed: usize,
}

/// GET /api/cqrs
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<CqrsStatus>> {
    let mode = state.catalog.cqrs_mode();
    Json(ApiResponse::new(
        CqrsStatus {
            enabled: mode.is_enabled(),
            mode,
        },
        state.current_sequence_id(),
    ))
}

/// POST /api/cqrs/toggle - Flip the flag; enabling starts a background rebuild
pub async fn toggle(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<CqrsStatus>>, ApiError> {
    let toggled = state.catalog.toggle_cqrs()?;
    if let Some(handle) = toggled.rebuild {
        watch_rebuild(handle);
    }

    Ok(Json(ApiResponse::new(
        CqrsStatus {
            enabled: toggled.mode.is_enabled(),
            mode: toggled.mode,
        },
        state.current_sequence_id(),
    )))
}

/// POST /api/replay - Rebuild the application store regardless of the flag
pub async fn replay(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    watch_rebuild(state.catalog.replay_all()?);
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(
            RebuildAccepted { accepted: true },
            state.current_sequence_id(),
        )),
    ))
}

/// GET /api/state-changes/count
pub async fn count_state_changes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<StateChangeCounts>>, ApiError> {
    let counts = run_blocking(&state.catalog, |c| c.count_state_changes()).await?;
    Ok(Json(ApiResponse::new(counts, state.current_sequence_id())))
}

/// DELETE /api/store - Purge every materialized row
pub async fn purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Purged>>, ApiError> {
    let removed = run_blocking(&state.catalog, |c| c.purge()).await?;
    Ok(Json(ApiResponse::new(
        Purged { removed },
        state.current_sequence_id(),
    )))
}

/// Log the outcome of a detached rebuild; clients follow it over `/ws`
fn watch_rebuild(handle: RebuildHandle) {
    tokio::spawn(async move {
        match handle.join().await {
            Ok(outcome) => info!(
                cancelled = outcome.is_cancelled(),
                inserted = outcome.report().inserted,
                "Background rebuild ended"
            ),
            Err(e) => error!(error = %e, "Background rebuild failed"),
        }
    });
}
