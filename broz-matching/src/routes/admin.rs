//! Operator and downstream-service escape hatches that don't belong on the
//! participant-facing API: inspecting and clearing `fatal_suppressed`
//! participants, and the video-date subsystem's completion callback that
//! drives the `video_date -> ended` transition. Both require
//! service-level trust rather than a participant's own session, so both
//! sit behind `AdminUser` rather than `AuthUser`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use broz_shared::errors::{AppError, AppResult};
use broz_shared::middleware::AdminUser;
use broz_shared::types::api::ApiResponse;

use crate::events::publisher;
use crate::models::{MatchRecord, Participant};
use crate::schema::participants;
use crate::state_machine::{self, ParticipantState};
use crate::stores::match_store;
use crate::AppState;

/// `GET /matching/admin/participants/suppressed` — every participant currently taken
/// out of matching by a `Fatal` error, for operator triage.
pub async fn list_suppressed(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<Participant>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let rows = participants::table
        .filter(participants::fatal_suppressed.eq(true))
        .order(participants::updated_at.desc())
        .load::<Participant>(&mut conn)
        .map_err(|e| AppError::internal(format!("db error: {e}")))?;

    Ok(Json(ApiResponse::ok(rows)))
}

/// `POST /matching/admin/participants/:id/clear-fatal` — clears the suppression flag
/// so the next orchestrator cycle considers this participant again.
pub async fn clear_fatal(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(participant_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Participant>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    state_machine::clear_fatal(&mut conn, participant_id).map_err(|e| AppError::internal(e.to_string()))?;

    let updated: Participant = participants::table
        .find(participant_id)
        .first(&mut conn)
        .map_err(|e| AppError::internal(format!("db error: {e}")))?;

    Ok(Json(ApiResponse::ok(updated)))
}

#[derive(Debug, Deserialize)]
pub struct CompleteSessionRequest {
    #[serde(default)]
    pub end_reason: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct CompleteSessionResponse {
    pub match_id: Uuid,
}

/// `POST /matching/admin/matches/:id/complete` — the video-date subsystem's signal
/// that a promoted session has finished. Moves both participants
/// `video_date -> ended` and publishes `session.ended` with the elapsed
/// duration measured from the match's `both_yes` resolution.
pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(match_id): Path<Uuid>,
    Json(req): Json<CompleteSessionRequest>,
) -> AppResult<Json<ApiResponse<CompleteSessionResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let record: MatchRecord = match_store::find(&mut conn, match_id).map_err(|e| AppError::from(e))?;

    let started_at = record.ended_at.unwrap_or(record.created_at);
    let duration_secs = (chrono::Utc::now() - started_at).num_seconds().max(0) as i32;

    state_machine::transition(&mut conn, record.participant_a, ParticipantState::Ended, None, "session_complete")
        .map_err(|e| AppError::from(e))?;
    state_machine::transition(&mut conn, record.participant_b, ParticipantState::Ended, None, "session_complete")
        .map_err(|e| AppError::from(e))?;

    drop(conn);

    let rabbitmq = state.rabbitmq.clone();
    let end_reason = req.end_reason.unwrap_or_else(|| "completed".to_string());
    tokio::spawn(async move {
        publisher::publish_session_ended(
            &rabbitmq,
            match_id,
            record.participant_a,
            record.participant_b,
            duration_secs,
            &end_reason,
        )
        .await;
    });

    Ok(Json(ApiResponse::ok(CompleteSessionResponse { match_id })))
}
