//! The single authority for participant state transitions. Every
//! transition goes through `transition()`,
//! which atomically validates the current state against the allowed-
//! transitions table, applies the change, and writes one journal record,
//! all under a row-level lock on the participant. Rejecting an invalid
//! transition never mutates state.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::errors::{MatchingError, MatchingResult};
use crate::models::{Participant, ParticipantStateUpdate};
use crate::schema::participants;
use crate::stores::journal_store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Idle,
    SpinActive,
    QueueWaiting,
    Paired,
    VoteActive,
    VideoDate,
    SoftOffline,
    Ended,
}

impl ParticipantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SpinActive => "spin_active",
            Self::QueueWaiting => "queue_waiting",
            Self::Paired => "paired",
            Self::VoteActive => "vote_active",
            Self::VideoDate => "video_date",
            Self::SoftOffline => "soft_offline",
            Self::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> MatchingResult<Self> {
        Ok(match s {
            "idle" => Self::Idle,
            "spin_active" => Self::SpinActive,
            "queue_waiting" => Self::QueueWaiting,
            "paired" => Self::Paired,
            "vote_active" => Self::VoteActive,
            "video_date" => Self::VideoDate,
            "soft_offline" => Self::SoftOffline,
            "ended" => Self::Ended,
            other => return Err(MatchingError::Fatal(format!("unknown participant state {other}"))),
        })
    }

    fn is_matchable(&self) -> bool {
        matches!(self, Self::SpinActive | Self::QueueWaiting)
    }
}

/// Allowed-transitions table. `None` for `to` would mean "stay
/// put", which never appears here — every entry is a real move.
fn is_allowed(from: ParticipantState, to: ParticipantState) -> bool {
    use ParticipantState::*;
    match (from, to) {
        (Idle, SpinActive) => true,
        (SpinActive, QueueWaiting) => true,
        (SpinActive, Paired) | (QueueWaiting, Paired) => true,
        (Paired, VoteActive) => true,
        (VoteActive, VideoDate) => true,
        (VoteActive, SpinActive) => true,
        (VoteActive, Idle) => true,
        // A partner whose other side disconnects before voting even starts
        // (spec scenario: disconnect at match formation) is freed straight
        // back to spin_active from `paired`, mirroring the `vote_active ->
        // spin_active` row for the same "match cancelled, rejoin" effect.
        (Paired, SpinActive) => true,
        (VideoDate, Ended) => true,
        // A deliberate `leave` while merely queued has no dedicated row
        // elsewhere in this table (only `vote_active -> idle` does); this
        // is the queued-state analogue so `leave` always has a terminal
        // move available. See DESIGN.md's Open Questions.
        (SpinActive, Idle) | (QueueWaiting, Idle) => true,
        // Guardian-only recovery transitions: a participant stuck in
        // `paired` with no live match record (crash mid-protocol, or the
        // other side already reconciled) has no other way back to `idle`.
        (Paired, Idle) => true,
        // soft_offline is reachable from any matchable-or-paired state and
        // recoverable back to it; handled by the dedicated
        // `enter_soft_offline`/`restore_from_soft_offline` helpers below
        // rather than this table, since "previous" is data, not a fixed
        // target.
        (_, SoftOffline) => matches!(from, SpinActive | QueueWaiting | Paired | VoteActive),
        (SoftOffline, Idle) | (SoftOffline, Ended) => true,
        _ => false,
    }
}

fn touch_participant_exists(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<Participant> {
    participants::table
        .find(participant_id)
        .for_update()
        .first::<Participant>(conn)
        .optional()?
        .ok_or_else(|| MatchingError::NotFound(format!("participant {participant_id} not found")))
}

/// Validates and applies `to`, optionally updating `current_match_id`.
/// Must be called inside a transaction that already holds (or is about to
/// take) the row lock via `SELECT ... FOR UPDATE` — this function performs
/// that lock itself if not already inside one, since Postgres row locks
/// nest harmlessly within the same transaction.
pub fn transition(
    conn: &mut PgConnection,
    participant_id: Uuid,
    to: ParticipantState,
    current_match_id: Option<Option<Uuid>>,
    trigger: &str,
) -> MatchingResult<Participant> {
    conn.transaction(|conn| {
        let current = touch_participant_exists(conn, participant_id)?;
        let from = ParticipantState::parse(&current.state)?;

        if !is_allowed(from, to) {
            return Err(MatchingError::InvalidTransition(format!(
                "{} -> {} not allowed (trigger: {trigger})",
                from.as_str(),
                to.as_str()
            )));
        }

        apply(conn, &current, to, current_match_id, trigger)
    })
}

/// Special-cased entry into `soft_offline`, preserving the prior state so
/// it can be restored verbatim within the grace window.
pub fn enter_soft_offline(conn: &mut PgConnection, participant_id: Uuid, trigger: &str) -> MatchingResult<Participant> {
    conn.transaction(|conn| {
        let current = touch_participant_exists(conn, participant_id)?;
        let from = ParticipantState::parse(&current.state)?;

        if !is_allowed(from, ParticipantState::SoftOffline) {
            return Err(MatchingError::InvalidTransition(format!(
                "{} -> soft_offline not allowed (trigger: {trigger})",
                from.as_str()
            )));
        }

        apply(conn, &current, ParticipantState::SoftOffline, None, trigger)
    })
}

/// Restores a `soft_offline` participant to whatever state it was in
/// before going offline (spec: "soft_offline -> previous; heartbeat
/// restored within grace").
pub fn restore_from_soft_offline(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<Participant> {
    conn.transaction(|conn| {
        let current = touch_participant_exists(conn, participant_id)?;
        let from = ParticipantState::parse(&current.state)?;
        if from != ParticipantState::SoftOffline {
            return Err(MatchingError::InvalidTransition(format!(
                "{} is not soft_offline, cannot restore",
                from.as_str()
            )));
        }

        let prev = current
            .prev_state
            .as_deref()
            .map(ParticipantState::parse)
            .transpose()?
            .unwrap_or(ParticipantState::Idle);

        apply(conn, &current, prev, None, "heartbeat_restored")
    })
}

fn apply(
    conn: &mut PgConnection,
    current: &Participant,
    to: ParticipantState,
    current_match_id: Option<Option<Uuid>>,
    trigger: &str,
) -> MatchingResult<Participant> {
    let now = chrono::Utc::now();
    let update = ParticipantStateUpdate {
        state: to.as_str().to_string(),
        prev_state: Some(current.state.clone()),
        current_match_id: current_match_id.unwrap_or(current.current_match_id),
        updated_at: now,
    };

    let updated = diesel::update(participants::table.find(current.id))
        .set(&update)
        .get_result::<Participant>(conn)?;

    journal_store::append(
        conn,
        Some(current.id),
        updated.current_match_id,
        "participant_state_changed",
        json!({
            "from": current.state,
            "to": updated.state,
            "trigger": trigger,
        }),
    )?;

    Ok(updated)
}

/// Whether `state` is one from which orchestration/matching can proceed
/// (spin_active or queue_waiting).
pub fn is_matchable(state: &str) -> MatchingResult<bool> {
    Ok(ParticipantState::parse(state)?.is_matchable())
}

/// Marks a participant `fatal_suppressed`, taking it out of orchestrator
/// consideration until an operator clears it manually.
pub fn suppress_fatal(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<()> {
    diesel::update(participants::table.find(participant_id))
        .set(participants::fatal_suppressed.eq(true))
        .execute(conn)?;
    journal_store::append(conn, Some(participant_id), None, "fatal_suppressed", json!({}))?;
    Ok(())
}

/// Clears a previously-set `fatal_suppressed` flag (the admin escape hatch).
pub fn clear_fatal(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<()> {
    diesel::update(participants::table.find(participant_id))
        .set(participants::fatal_suppressed.eq(false))
        .execute(conn)?;
    journal_store::append(conn, Some(participant_id), None, "fatal_cleared", json!({}))?;
    Ok(())
}

/// Ensures a participant row exists, inserting one in `idle` if this is its
/// first contact with the core.
pub fn ensure_participant(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<Participant> {
    use crate::models::NewParticipant;

    diesel::insert_into(participants::table)
        .values(&NewParticipant {
            id: participant_id,
            state: ParticipantState::Idle.as_str().to_string(),
        })
        .on_conflict(participants::id)
        .do_nothing()
        .execute(conn)?;

    participants::table
        .find(participant_id)
        .first::<Participant>(conn)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ParticipantState::*;

    #[test]
    fn idle_only_advances_via_spin() {
        assert!(is_allowed(Idle, SpinActive));
        assert!(!is_allowed(Idle, QueueWaiting));
        assert!(!is_allowed(Idle, Paired));
    }

    #[test]
    fn paired_partner_freed_straight_to_spin_active_on_disconnect() {
        assert!(is_allowed(Paired, SpinActive));
    }

    #[test]
    fn pairing_reachable_from_spin_active_or_queue_waiting_only() {
        assert!(is_allowed(SpinActive, Paired));
        assert!(is_allowed(QueueWaiting, Paired));
        assert!(!is_allowed(Idle, Paired));
        assert!(!is_allowed(VoteActive, Paired));
    }

    #[test]
    fn vote_active_resolves_to_video_date_spin_active_or_idle_only() {
        assert!(is_allowed(VoteActive, VideoDate));
        assert!(is_allowed(VoteActive, SpinActive));
        assert!(is_allowed(VoteActive, Idle));
        assert!(!is_allowed(VoteActive, Paired));
        assert!(!is_allowed(VoteActive, QueueWaiting));
    }

    #[test]
    fn video_date_only_ends() {
        assert!(is_allowed(VideoDate, Ended));
        assert!(!is_allowed(VideoDate, Idle));
        assert!(!is_allowed(VideoDate, SpinActive));
    }

    #[test]
    fn soft_offline_reachable_only_from_matchable_or_paired_states() {
        for from in [SpinActive, QueueWaiting, Paired, VoteActive] {
            assert!(is_allowed(from, SoftOffline), "{from:?} should reach soft_offline");
        }
        for from in [Idle, VideoDate, Ended] {
            assert!(!is_allowed(from, SoftOffline), "{from:?} must not reach soft_offline");
        }
    }

    #[test]
    fn soft_offline_only_finalizes_to_idle_or_ended() {
        assert!(is_allowed(SoftOffline, Idle));
        assert!(is_allowed(SoftOffline, Ended));
        assert!(!is_allowed(SoftOffline, SpinActive));
        assert!(!is_allowed(SoftOffline, Paired));
    }

    #[test]
    fn ended_is_terminal() {
        for to in [Idle, SpinActive, QueueWaiting, Paired, VoteActive, VideoDate, SoftOffline] {
            assert!(!is_allowed(Ended, to), "ended must not transition to {to:?}");
        }
    }

    #[test]
    fn parse_round_trips_every_state() {
        for state in [Idle, SpinActive, QueueWaiting, Paired, VoteActive, VideoDate, SoftOffline, Ended] {
            assert_eq!(ParticipantState::parse(state.as_str()).unwrap(), state);
        }
    }

    #[test]
    fn parse_rejects_unknown_state() {
        assert!(ParticipantState::parse("banana").is_err());
    }

    #[test]
    fn is_matchable_true_only_for_spin_active_and_queue_waiting() {
        assert!(SpinActive.is_matchable());
        assert!(QueueWaiting.is_matchable());
        assert!(!Paired.is_matchable());
        assert!(!Idle.is_matchable());
        assert!(!VoteActive.is_matchable());
    }
}
