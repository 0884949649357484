//! The transport surface the spin/ack/vote/reveal-complete/heartbeat/leave/
//! status operations are exposed through. Every handler converts a
//! `MatchingError` into an `AppError` at the boundary and never leaks a raw
//! store error.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use broz_shared::errors::{AppError, AppResult, ErrorCode};
use broz_shared::types::api::ApiResponse;
use broz_shared::types::auth::AuthUser;

use crate::errors::MatchingError;
use crate::events::publisher;
use crate::models::{MatchRecord, Outcome, Participant, QueueEntry, Vote};
use crate::orchestrator;
use crate::state_machine::{self, ParticipantState};
use crate::stores::{match_store, queue_store};
use crate::voting;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinStatus {
    Paired,
    Queued,
}

#[derive(Debug, Serialize)]
pub struct SpinResponse {
    pub status: SpinStatus,
    pub match_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
}

/// `POST /matching/spin` — idle -> spin_active, joins the queue, and makes one
/// immediate attempt to pair before falling back to the periodic
/// orchestrator cycle.
pub async fn spin(auth: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<SpinResponse>>> {
    let participant_id = auth.id;
    let profile = state
        .directory
        .get_profile(participant_id)
        .await
        .map_err(app_err)?;

    {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        state_machine::ensure_participant(&mut conn, participant_id).map_err(app_err)?;
        state_machine::transition(&mut conn, participant_id, ParticipantState::SpinActive, None, "spin_request")
            .map_err(app_err)?;

        let filters = serde_json::to_value(&profile.preferences).unwrap_or(serde_json::Value::Null);
        let snapshot = serde_json::json!({ "gender": format!("{:?}", profile.gender), "age": profile.age, "coarse_location": profile.coarse_location });
        queue_store::join(&mut conn, participant_id, filters, snapshot).map_err(app_err)?;
    }

    let outcome = orchestrator::attempt_match_for_participant(
        &state.db,
        state.directory.as_ref(),
        &state.config,
        &state.rabbitmq,
        participant_id,
    )
    .await
    .map_err(app_err)?;

    match outcome {
        Some(paired) => {
            let partner_id = if paired.participant_a == participant_id { paired.participant_b } else { paired.participant_a };
            Ok(Json(ApiResponse::ok(SpinResponse {
                status: SpinStatus::Paired,
                match_id: Some(paired.match_id),
                partner_id: Some(partner_id),
            })))
        }
        None => {
            let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
            // A fresh spin that didn't pair on its first attempt moves to
            // queue_waiting; it may already be there if this is a retry.
            let _ = state_machine::transition(&mut conn, participant_id, ParticipantState::QueueWaiting, None, "no_match_first_cycle");
            Ok(Json(ApiResponse::ok(SpinResponse {
                status: SpinStatus::Queued,
                match_id: None,
                partner_id: None,
            })))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MatchIdRequest {
    pub match_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub both_acknowledged: bool,
}

/// `POST /matching/ack` — marks this side's acknowledgement of a `paired` match;
/// once both sides have acknowledged, opens the vote window and moves both
/// participants to `vote_active`.
pub async fn ack(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MatchIdRequest>,
) -> AppResult<Json<ApiResponse<AckResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let record = match_store::record_ack(&mut conn, req.match_id, auth.id).map_err(app_err)?;

    let both = record.ack_a && record.ack_b && record.status == match_store::STATUS_PAIRED;
    if both {
        match_store::start_vote_window(&mut conn, req.match_id, state.config.vote_window_ms as i64)
            .map_err(app_err)?;
        state_machine::transition(&mut conn, record.participant_a, ParticipantState::VoteActive, None, "both_acknowledged")
            .map_err(app_err)?;
        state_machine::transition(&mut conn, record.participant_b, ParticipantState::VoteActive, None, "both_acknowledged")
            .map_err(app_err)?;
    }

    Ok(Json(ApiResponse::ok(AckResponse { both_acknowledged: both })))
}

/// `POST /matching/reveal-complete` — the reveal-timer analogue of `ack`: a second,
/// independent client signal that also gates entry into `vote_active`,
/// modeled against the same `ack_a`/`ack_b` flags.
pub async fn reveal_complete(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MatchIdRequest>,
) -> AppResult<Json<ApiResponse<AckResponse>>> {
    ack(auth, State(state), Json(req)).await
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub match_id: Uuid,
    pub vote: VoteChoice,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Yes,
    Pass,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub resolved: bool,
    pub outcome: Option<String>,
}

/// `POST /matching/vote` — records a yes/pass decision, resolving the match
/// immediately if both sides have now decided.
pub async fn vote(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<VoteRequest>,
) -> AppResult<Json<ApiResponse<VoteResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let record = match_store::find(&mut conn, req.match_id).map_err(app_err)?;
    if record.status != match_store::STATUS_VOTE_ACTIVE && record.status != match_store::STATUS_ENDED {
        return Err(AppError::new(ErrorCode::InvalidTransition, "vote received before the vote window opened"));
    }

    let vote_value = match req.vote {
        VoteChoice::Yes => Vote::Yes,
        VoteChoice::Pass => Vote::Pass,
    };

    let outcome = voting::record_vote(&mut conn, req.match_id, auth.id, vote_value)
        .map_err(app_err)?;
    drop(conn);

    {
        let rabbitmq = state.rabbitmq.clone();
        let match_id = req.match_id;
        let participant_id = auth.id;
        let vote_str = vote_value.as_str();
        tokio::spawn(async move {
            publisher::publish_vote_recorded(&rabbitmq, match_id, participant_id, vote_str).await;
        });
    }

    let response = match &outcome {
        Some(resolved) => {
            let rabbitmq = state.rabbitmq.clone();
            let match_id = resolved.match_id;
            let participant_a = resolved.participant_a;
            let participant_b = resolved.participant_b;
            let outcome_str = resolved.outcome.as_str();
            let is_both_yes = resolved.outcome == Outcome::BothYes;
            tokio::spawn(async move {
                publisher::publish_outcome_resolved(&rabbitmq, match_id, participant_a, participant_b, outcome_str).await;
                if is_both_yes {
                    // Pair-accept event for the video-date subsystem.
                    publisher::publish_session_started(&rabbitmq, match_id, participant_a, participant_b).await;
                }
            });
            VoteResponse { resolved: true, outcome: Some(resolved.outcome.as_str().to_string()) }
        }
        None => VoteResponse { resolved: false, outcome: None },
    };

    Ok(Json(ApiResponse::ok(response)))
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub state: String,
}

/// `POST /matching/heartbeat` — liveness ping; restores from `soft_offline` within
/// the grace window.
pub async fn heartbeat(auth: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<HeartbeatResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let participant = crate::heartbeat::record_heartbeat(&mut conn, auth.id, &state.config).map_err(app_err)?;
    Ok(Json(ApiResponse::ok(HeartbeatResponse { state: participant.state })))
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub state: String,
}

/// `POST /matching/leave` — removes a queued participant from the queue, or cancels
/// an in-flight match, returning the participant to `idle`.
pub async fn leave(auth: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<LeaveResponse>>> {
    use crate::schema::participants::dsl as p;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    queue_store::remove(&mut conn, auth.id).map_err(app_err)?;

    let current: Participant = p::participants
        .find(auth.id)
        .first(&mut conn)
        .map_err(|e| app_err(MatchingError::from(e)))?;

    let final_state = match current.state.as_str() {
        "paired" | "vote_active" => {
            if let Some(match_id) = current.current_match_id {
                let outcome = voting::cancel(&mut conn, match_id, auth.id, ParticipantState::Idle)
                    .map_err(app_err)?;
                drop(conn);
                let rabbitmq = state.rabbitmq.clone();
                tokio::spawn(async move {
                    publisher::publish_outcome_resolved(&rabbitmq, outcome.match_id, outcome.participant_a, outcome.participant_b, outcome.outcome.as_str()).await;
                });
                ParticipantState::Idle.as_str().to_string()
            } else {
                let updated = state_machine::transition(&mut conn, auth.id, ParticipantState::Idle, None, "leave_request")
                    .map_err(app_err)?;
                updated.state
            }
        }
        "spin_active" | "queue_waiting" => {
            let updated = state_machine::transition(&mut conn, auth.id, ParticipantState::Idle, None, "leave_request")
                .map_err(app_err)?;
            updated.state
        }
        other => other.to_string(),
    };

    Ok(Json(ApiResponse::ok(LeaveResponse { state: final_state })))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub participant: Participant,
    pub queue_entry: Option<QueueEntry>,
    pub current_match: Option<MatchRecord>,
}

/// `GET /matching/status` — the polling fallback for a missed push notification.
pub async fn status(auth: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<StatusResponse>>> {
    use crate::schema::participants::dsl as p;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let participant: Participant = p::participants
        .find(auth.id)
        .first(&mut conn)
        .map_err(|e| app_err(MatchingError::from(e)))?;

    let queue_entry = queue_store::find(&mut conn, auth.id).map_err(app_err)?;
    let current_match = match participant.current_match_id {
        Some(match_id) => match_store::find(&mut conn, match_id).ok(),
        None => None,
    };

    Ok(Json(ApiResponse::ok(StatusResponse { participant, queue_entry, current_match })))
}

fn app_err(err: MatchingError) -> AppError {
    err.into()
}
