//! Records of active/resolved pairings and votes. The unique partial
//! index on `match_records (participant_a, participant_b) WHERE status IN
//! ('paired', 'vote_active')` (see migrations) enforces at most one
//! non-terminal match per canonical pair; this module is the only place
//! that inserts rows here.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::errors::{MatchingError, MatchingResult};
use crate::models::{canonical_pair, MatchRecord, MatchRecordUpdate, NewMatchRecord, Vote};
use crate::schema::match_records;

pub const STATUS_PAIRED: &str = "paired";
pub const STATUS_VOTE_ACTIVE: &str = "vote_active";
pub const STATUS_ENDED: &str = "ended";

/// Inserts a new non-terminal match record for the canonical pair `(a, b)`.
/// On a unique-constraint collision, returns the existing non-terminal
/// record's id instead of erroring, since a concurrent insert of the same
/// pair is a race won by someone else, not a failure.
pub fn create_if_absent(
    conn: &mut PgConnection,
    a: Uuid,
    b: Uuid,
    tier: i16,
) -> MatchingResult<Uuid> {
    let (lo, hi) = canonical_pair(a, b);
    let new_record = NewMatchRecord {
        id: Uuid::now_v7(),
        participant_a: lo,
        participant_b: hi,
        status: STATUS_PAIRED.to_string(),
        tier,
    };

    let inserted = diesel::insert_into(match_records::table)
        .values(&new_record)
        .get_result::<MatchRecord>(conn);

    match inserted {
        Ok(record) => Ok(record.id),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            match find_active_for_pair(conn, lo, hi)? {
                Some(existing) => Ok(existing.id),
                None => Err(MatchingError::DuplicatePair(format!(
                    "unique violation for ({lo}, {hi}) but no active record found"
                ))),
            }
        }
        Err(e) => Err(e.into()),
    }
}

pub fn find(conn: &mut PgConnection, match_id: Uuid) -> MatchingResult<MatchRecord> {
    match_records::table
        .find(match_id)
        .first::<MatchRecord>(conn)
        .optional()?
        .ok_or_else(|| MatchingError::NotFound(format!("match {match_id} not found")))
}

pub fn find_active_for_pair(
    conn: &mut PgConnection,
    a: Uuid,
    b: Uuid,
) -> MatchingResult<Option<MatchRecord>> {
    let (lo, hi) = canonical_pair(a, b);
    let record = match_records::table
        .filter(match_records::participant_a.eq(lo))
        .filter(match_records::participant_b.eq(hi))
        .filter(match_records::status.ne(STATUS_ENDED))
        .first::<MatchRecord>(conn)
        .optional()?;
    Ok(record)
}

/// Only the Atomic Pair Creator calls this, on rollback after a failed
/// state-machine commit.
pub fn delete(conn: &mut PgConnection, match_id: Uuid) -> MatchingResult<()> {
    diesel::delete(match_records::table.find(match_id)).execute(conn)?;
    Ok(())
}

pub fn start_vote_window(
    conn: &mut PgConnection,
    match_id: Uuid,
    window_ms: i64,
) -> MatchingResult<MatchRecord> {
    let now = chrono::Utc::now();
    let expiry = now + chrono::Duration::milliseconds(window_ms);

    diesel::update(match_records::table.find(match_id))
        .set((
            match_records::status.eq(STATUS_VOTE_ACTIVE),
            match_records::vote_window_start.eq(Some(now)),
            match_records::vote_window_expiry.eq(Some(expiry)),
        ))
        .get_result::<MatchRecord>(conn)
        .map_err(Into::into)
}

pub fn record_ack(conn: &mut PgConnection, match_id: Uuid, participant_id: Uuid) -> MatchingResult<MatchRecord> {
    let record = find(conn, match_id)?;
    let update = if participant_id == record.participant_a {
        MatchRecordUpdate { ack_a: Some(true), ..Default::default() }
    } else if participant_id == record.participant_b {
        MatchRecordUpdate { ack_b: Some(true), ..Default::default() }
    } else {
        return Err(MatchingError::NotFound(format!(
            "participant {participant_id} is not part of match {match_id}"
        )));
    };

    diesel::update(match_records::table.find(match_id))
        .set(&update)
        .get_result::<MatchRecord>(conn)
        .map_err(Into::into)
}

/// Upserts a side's vote. Idempotent: recording the same vote twice leaves
/// the row unchanged.
pub fn record_vote(
    conn: &mut PgConnection,
    match_id: Uuid,
    participant_id: Uuid,
    vote: Vote,
) -> MatchingResult<MatchRecord> {
    let record = find(conn, match_id)?;
    let update = if participant_id == record.participant_a {
        MatchRecordUpdate { vote_a: Some(vote.as_str().to_string()), ..Default::default() }
    } else if participant_id == record.participant_b {
        MatchRecordUpdate { vote_b: Some(vote.as_str().to_string()), ..Default::default() }
    } else {
        return Err(MatchingError::NotFound(format!(
            "participant {participant_id} is not part of match {match_id}"
        )));
    };

    diesel::update(match_records::table.find(match_id))
        .set(&update)
        .get_result::<MatchRecord>(conn)
        .map_err(Into::into)
}

pub fn resolve_outcome(
    conn: &mut PgConnection,
    match_id: Uuid,
    outcome: &str,
) -> MatchingResult<MatchRecord> {
    let update = MatchRecordUpdate {
        status: Some(STATUS_ENDED.to_string()),
        outcome: Some(outcome.to_string()),
        ended_at: Some(chrono::Utc::now()),
        ..Default::default()
    };

    diesel::update(match_records::table.find(match_id))
        .set(&update)
        .get_result::<MatchRecord>(conn)
        .map_err(Into::into)
}

/// Match records whose vote window has expired but which are still
/// `vote_active` — consulted by the Guardians ("resolve vote windows that
/// should have closed").
pub fn expired_vote_windows(conn: &mut PgConnection) -> MatchingResult<Vec<MatchRecord>> {
    let now = chrono::Utc::now();
    let records = match_records::table
        .filter(match_records::status.eq(STATUS_VOTE_ACTIVE))
        .filter(match_records::vote_window_expiry.lt(now))
        .load::<MatchRecord>(conn)?;
    Ok(records)
}

/// Non-terminal records whose participants aren't both in `paired`/
/// `vote_active` anymore — consulted by the Guardians to terminate ghost
/// matches.
pub fn non_terminal(conn: &mut PgConnection) -> MatchingResult<Vec<MatchRecord>> {
    let records = match_records::table
        .filter(match_records::status.ne(STATUS_ENDED))
        .load::<MatchRecord>(conn)?;
    Ok(records)
}
