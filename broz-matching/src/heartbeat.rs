//! Heartbeat / offline manager. Participants emit
//! heartbeats at a fixed cadence; a gap beyond `offline_threshold_ms` moves
//! a participant to `soft_offline`, boosting and freeing its partner if it
//! was mid-match. A grace window allows restoration before finalizing to
//! `idle`.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::MatchingResult;
use crate::models::Participant;
use crate::state_machine::{self, ParticipantState};
use crate::stores::queue_store;

/// Records a heartbeat. If the participant was `soft_offline` and still
/// within its grace window, restores it to its prior state.
pub fn record_heartbeat(conn: &mut PgConnection, participant_id: Uuid, config: &AppConfig) -> MatchingResult<Participant> {
    use crate::schema::participants::dsl::*;

    let now = chrono::Utc::now();
    let current: Participant = diesel::update(participants.find(participant_id))
        .set(last_heartbeat_at.eq(now))
        .get_result(conn)?;

    if current.state == ParticipantState::SoftOffline.as_str() {
        let grace_deadline = current.updated_at + chrono::Duration::milliseconds(config.grace_ms as i64);
        if now <= grace_deadline {
            return state_machine::restore_from_soft_offline(conn, participant_id);
        }
    }

    Ok(current)
}

/// Moves a participant into `soft_offline` once its heartbeat gap exceeds
/// `offline_threshold_ms`, cancelling any in-flight match and boosting the
/// partner back to `spin_active`. Returns the partner's id if one was
/// freed, so the caller can emit notifications/re-trigger orchestration.
pub fn detect_offline(
    conn: &mut PgConnection,
    participant_id: Uuid,
    config: &AppConfig,
) -> MatchingResult<Option<Uuid>> {
    let current = state_machine::enter_soft_offline(conn, participant_id, "heartbeat_gap_exceeded")?;

    let Some(match_id) = current.current_match_id else {
        return Ok(None);
    };

    let record = crate::stores::match_store::find(conn, match_id)?;
    if record.status == crate::stores::match_store::STATUS_ENDED {
        return Ok(None);
    }

    let partner = if record.participant_a == participant_id {
        record.participant_b
    } else {
        record.participant_a
    };

    crate::stores::match_store::resolve_outcome(conn, match_id, crate::models::Outcome::Cancelled.as_str())?;
    state_machine::transition(conn, partner, ParticipantState::SpinActive, None, "partner_soft_offline")?;
    queue_store::boost(conn, partner, config.fairness_boost_value as f64)?;

    Ok(Some(partner))
}

/// Finalizes a `soft_offline` participant whose grace window has expired:
/// transitions to `idle` and removes any stale queue entry.
pub fn finalize_offline(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<()> {
    state_machine::transition(conn, participant_id, ParticipantState::Idle, None, "grace_window_expired")?;
    queue_store::remove(conn, participant_id)?;
    Ok(())
}

/// Participants whose heartbeat has gone stale beyond `offline_threshold_ms`
/// but who are not yet `soft_offline` — consulted by the Guardians.
pub fn stale_participants(conn: &mut PgConnection, threshold_ms: i64) -> MatchingResult<Vec<Uuid>> {
    use crate::schema::participants::dsl::*;

    let cutoff = chrono::Utc::now() - chrono::Duration::milliseconds(threshold_ms);
    let ids = participants
        .filter(last_heartbeat_at.lt(cutoff))
        .filter(state.ne(ParticipantState::SoftOffline.as_str()))
        .filter(state.ne(ParticipantState::Idle.as_str()))
        .filter(state.ne(ParticipantState::Ended.as_str()))
        // A lapsed heartbeat during `video_date` isn't a matching-core
        // concern — the video-date subsystem owns that liveness check — so
        // flagging it here would just be a spurious warning that can never
        // transition anywhere (state_machine has no `video_date ->
        // soft_offline` row).
        .filter(state.ne(ParticipantState::VideoDate.as_str()))
        .select(id)
        .load(conn)?;
    Ok(ids)
}

/// `soft_offline` participants whose grace window has expired —
/// consulted by the Guardians to finalize to `idle`.
pub fn grace_expired_participants(conn: &mut PgConnection, grace_ms: i64) -> MatchingResult<Vec<Uuid>> {
    use crate::schema::participants::dsl::*;

    let cutoff = chrono::Utc::now() - chrono::Duration::milliseconds(grace_ms);
    let ids = participants
        .filter(state.eq(ParticipantState::SoftOffline.as_str()))
        .filter(updated_at.lt(cutoff))
        .select(id)
        .load(conn)?;
    Ok(ids)
}
