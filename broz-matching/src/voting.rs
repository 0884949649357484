//! Records votes and resolves outcomes under a match-level advisory lock.
//! Vote-record + outcome resolution + downstream state transitions +
//! history insertion execute as one logical transaction; idempotent on
//! replay of the same vote.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::db::locks::MatchLockGuard;
use crate::errors::{MatchingError, MatchingResult};
use crate::models::{MatchRecord, Outcome, Vote};
use crate::state_machine::{self, ParticipantState};
use crate::stores::{history_store, journal_store, match_store, queue_store};

pub struct VoteOutcome {
    pub match_id: Uuid,
    pub outcome: Outcome,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
}

/// Records one side's vote. If both sides now have a decision (or the
/// window has expired), resolves the outcome in the same pass. Returns
/// `Ok(None)` if the match isn't ready to resolve yet (the other side
/// hasn't voted and the window is still open).
pub fn record_vote(
    conn: &mut PgConnection,
    match_id: Uuid,
    participant_id: Uuid,
    vote: Vote,
) -> MatchingResult<Option<VoteOutcome>> {
    let Some(mut guard) = MatchLockGuard::acquire(conn, match_id).map_err(MatchingError::from)? else {
        return Err(MatchingError::LockContention(format!(
            "match {match_id} is being concurrently processed"
        )));
    };

    with_lock_held(guard.conn(), match_id, participant_id, Some(vote))
}

/// Called by the Guardians for `vote_active` matches whose window has
/// expired: resolves with whatever votes are present, treating a missing
/// side as idle, without requiring a new vote from either participant.
pub fn resolve_expired(conn: &mut PgConnection, match_id: Uuid) -> MatchingResult<Option<VoteOutcome>> {
    let Some(mut guard) = MatchLockGuard::acquire(conn, match_id).map_err(MatchingError::from)? else {
        return Err(MatchingError::LockContention(format!(
            "match {match_id} is being concurrently processed"
        )));
    };

    with_lock_held(guard.conn(), match_id, Uuid::nil(), None)
}

fn with_lock_held(
    conn: &mut PgConnection,
    match_id: Uuid,
    participant_id: Uuid,
    vote: Option<Vote>,
) -> MatchingResult<Option<VoteOutcome>> {
    conn.transaction(|conn| {
        let record = match_store::find(conn, match_id)?;

        if record.status == match_store::STATUS_ENDED {
            // Idempotent replay: the outcome already exists, nothing to do.
            return Ok(None);
        }

        let record = if let Some(vote) = vote {
            match_store::record_vote(conn, match_id, participant_id, vote)?
        } else {
            record
        };

        let now = chrono::Utc::now();
        let window_expired = record
            .vote_window_expiry
            .map(|expiry| expiry <= now)
            .unwrap_or(false);

        let vote_a = Vote::from_str(&record.vote_a);
        let vote_b = Vote::from_str(&record.vote_b);
        let both_decided = vote_a != Vote::None && vote_b != Vote::None;

        if !both_decided && !window_expired {
            return Ok(None);
        }

        resolve(conn, &record, vote_a, vote_b)
    })
}

fn resolve(
    conn: &mut PgConnection,
    record: &MatchRecord,
    vote_a: Vote,
    vote_b: Vote,
) -> MatchingResult<Option<VoteOutcome>> {
    let outcome = Outcome::resolve(vote_a, vote_b);
    let a = record.participant_a;
    let b = record.participant_b;

    match_store::resolve_outcome(conn, record.id, outcome.as_str())?;

    match outcome {
        Outcome::BothYes => {
            state_machine::transition(conn, a, ParticipantState::VideoDate, None, "outcome_both_yes")?;
            state_machine::transition(conn, b, ParticipantState::VideoDate, None, "outcome_both_yes")?;
            history_store::record_mutual_accept(conn, a, b)?;
        }
        Outcome::YesPass | Outcome::YesIdle => {
            let (yes_side, other_side) = if vote_a == Vote::Yes { (a, b) } else { (b, a) };
            state_machine::transition(conn, yes_side, ParticipantState::SpinActive, None, "outcome_yes_rejoin")?;
            queue_store::boost(conn, yes_side, 10.0)?;
            state_machine::transition(conn, other_side, ParticipantState::Idle, None, "outcome_requires_manual_respin")?;
            history_store::record_pairing(conn, a, b)?;
        }
        Outcome::PassPass => {
            state_machine::transition(conn, a, ParticipantState::SpinActive, None, "outcome_pass_pass")?;
            state_machine::transition(conn, b, ParticipantState::SpinActive, None, "outcome_pass_pass")?;
            history_store::record_pairing(conn, a, b)?;
        }
        Outcome::PassIdle => {
            let (pass_side, idle_side) = if vote_a == Vote::Pass { (a, b) } else { (b, a) };
            state_machine::transition(conn, pass_side, ParticipantState::SpinActive, None, "outcome_pass_rejoin")?;
            state_machine::transition(conn, idle_side, ParticipantState::Idle, None, "outcome_requires_manual_respin")?;
            history_store::record_pairing(conn, a, b)?;
        }
        Outcome::IdleIdle => {
            state_machine::transition(conn, a, ParticipantState::Idle, None, "outcome_idle_idle")?;
            state_machine::transition(conn, b, ParticipantState::Idle, None, "outcome_idle_idle")?;
            history_store::record_pairing(conn, a, b)?;
        }
        Outcome::Cancelled => {
            // Never produced by `Outcome::resolve`; cancellation is handled
            // directly by `cancel` below, which bypasses the vote table.
        }
    }

    journal_store::append(
        conn,
        None,
        Some(record.id),
        "outcome_resolved",
        json!({ "outcome": outcome.as_str(), "participant_a": a, "participant_b": b }),
    )?;

    Ok(Some(VoteOutcome {
        match_id: record.id,
        outcome,
        participant_a: a,
        participant_b: b,
    }))
}

/// Handles a disconnect at match formation (before voting begins): the
/// remaining partner is reset to `spin_active`, the disconnected side goes
/// to `idle` or `soft_offline` depending on what the Heartbeat Manager has
/// already determined — `disconnected_target` carries that choice.
pub fn cancel(
    conn: &mut PgConnection,
    match_id: Uuid,
    disconnected: Uuid,
    disconnected_target: ParticipantState,
) -> MatchingResult<VoteOutcome> {
    conn.transaction(|conn| {
        let record = match_store::find(conn, match_id)?;
        let partner = if record.participant_a == disconnected {
            record.participant_b
        } else {
            record.participant_a
        };

        match_store::resolve_outcome(conn, match_id, Outcome::Cancelled.as_str())?;
        state_machine::transition(conn, partner, ParticipantState::SpinActive, None, "match_cancelled")?;
        state_machine::transition(conn, disconnected, disconnected_target, None, "match_cancelled")?;

        journal_store::append(
            conn,
            None,
            Some(match_id),
            "outcome_resolved",
            json!({ "outcome": "cancelled", "disconnected": disconnected }),
        )?;

        Ok(VoteOutcome {
            match_id,
            outcome: Outcome::Cancelled,
            participant_a: record.participant_a,
            participant_b: record.participant_b,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_yes_resolves_to_both_yes() {
        assert_eq!(Outcome::resolve(Vote::Yes, Vote::Yes), Outcome::BothYes);
    }

    #[test]
    fn missing_vote_counts_as_idle() {
        assert_eq!(Outcome::resolve(Vote::Yes, Vote::None), Outcome::YesIdle);
        assert_eq!(Outcome::resolve(Vote::None, Vote::None), Outcome::IdleIdle);
    }
}
