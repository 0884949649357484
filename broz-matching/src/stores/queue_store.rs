//! Mapping from participant id to a single queue entry,
//! with a priority index over `(fairness_score desc, joined_at asc)` for
//! candidate scanning. `queue_entries.participant_id` is the primary key,
//! which is what enforces "at most one queue entry per participant".

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::errors::{MatchingError, MatchingResult};
use crate::models::{NewQueueEntry, QueueEntry};
use crate::schema::queue_entries;

/// Inserts a queue entry if absent. Idempotent: a pre-existing entry for
/// `participant_id` is returned unchanged rather than erroring. Callers are
/// expected to have already validated the participant's state is matchable
/// through the State Machine (this store never reads participant state).
pub fn join(
    conn: &mut PgConnection,
    participant_id: Uuid,
    filters: serde_json::Value,
    profile_snapshot: serde_json::Value,
) -> MatchingResult<QueueEntry> {
    if let Some(existing) = find(conn, participant_id)? {
        return Ok(existing);
    }

    let new_entry = NewQueueEntry {
        participant_id,
        fairness_score: 0.0,
        filters,
        profile_snapshot,
    };

    diesel::insert_into(queue_entries::table)
        .values(&new_entry)
        .on_conflict(queue_entries::participant_id)
        .do_nothing()
        .execute(conn)?;

    find(conn, participant_id)?.ok_or_else(|| {
        MatchingError::Transient(format!("queue entry vanished after insert for {participant_id}"))
    })
}

pub fn find(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<Option<QueueEntry>> {
    let entry = queue_entries::table
        .find(participant_id)
        .first::<QueueEntry>(conn)
        .optional()?;
    Ok(entry)
}

/// Removes a queue entry. Fail-soft: removing an absent entry is not an
/// error, consistent with boost/expand also being no-ops on missing
/// entries, and needed since guardian sweeps may race a participant's own
/// leave.
pub fn remove(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<()> {
    diesel::delete(queue_entries::table.find(participant_id)).execute(conn)?;
    Ok(())
}

/// Adds exactly `boost_value` to the entry's accumulated-boosts accumulator
/// (spec: always +10, never another magnitude), kept separate from
/// `fairness_score` so a recompute never silently discards a pending
/// boost. No-op if the entry is absent.
pub fn boost(conn: &mut PgConnection, participant_id: Uuid, boost_value: f64) -> MatchingResult<()> {
    diesel::update(queue_entries::table.find(participant_id))
        .set((
            queue_entries::accumulated_boosts.eq(queue_entries::accumulated_boosts + boost_value),
            queue_entries::last_update_at.eq(chrono::Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

/// Applies a freshly computed fairness score and expansion stage. Leaves
/// `accumulated_boosts` untouched — callers fold its current value into the
/// fairness formula before calling this, and it is only ever zeroed by
/// `clear_boosts` on match creation. No-op if the entry is absent (the
/// participant may have been paired concurrently).
pub fn update_fairness(
    conn: &mut PgConnection,
    participant_id: Uuid,
    fairness_score: f64,
    expansion_stage: i16,
) -> MatchingResult<()> {
    diesel::update(queue_entries::table.find(participant_id))
        .set((
            queue_entries::fairness_score.eq(fairness_score),
            queue_entries::expansion_stage.eq(expansion_stage),
            queue_entries::last_update_at.eq(chrono::Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn bump_skip_count(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<()> {
    diesel::update(queue_entries::table.find(participant_id))
        .set(queue_entries::skip_count.eq(queue_entries::skip_count + 1))
        .execute(conn)?;
    Ok(())
}

/// Consumes any accumulated boosts (resets the accumulator to zero).
/// Called by the Atomic Pair Creator immediately before removing the two
/// entries.
pub fn clear_boosts(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<()> {
    diesel::update(queue_entries::table.find(participant_id))
        .set(queue_entries::accumulated_boosts.eq(0.0))
        .execute(conn)?;
    Ok(())
}

/// Entries ordered by priority (fairness desc, joined_at asc), skipping
/// `self_id` and anything currently row-locked by another worker via
/// Postgres's `SKIP LOCKED` clause.
pub fn scan_priority_order(
    conn: &mut PgConnection,
    self_id: Uuid,
    limit: i64,
) -> MatchingResult<Vec<QueueEntry>> {
    let entries = queue_entries::table
        .filter(queue_entries::participant_id.ne(self_id))
        .order((
            queue_entries::fairness_score.desc(),
            queue_entries::joined_at.asc(),
        ))
        .limit(limit)
        .for_update()
        .skip_locked()
        .load::<QueueEntry>(conn)?;
    Ok(entries)
}

/// Entries ordered by priority, same as `scan_priority_order`, but
/// unbounded and without `FOR UPDATE`/`SKIP LOCKED`. Tier 3's
/// guaranteed-match fallback uses this instead of the capped, row-locking
/// scan: a participant waiting long enough to hit the fallback must see
/// every matchable row, not just whatever fits under `tier_scan_cap` or
/// happens not to be locked by a concurrent scan.
pub fn scan_all_matchable(conn: &mut PgConnection, self_id: Uuid) -> MatchingResult<Vec<QueueEntry>> {
    let entries = queue_entries::table
        .filter(queue_entries::participant_id.ne(self_id))
        .order((
            queue_entries::fairness_score.desc(),
            queue_entries::joined_at.asc(),
        ))
        .load::<QueueEntry>(conn)?;
    Ok(entries)
}

/// Counts queue rows beyond the first one per `participant_id`. The
/// primary key on `participant_id` already makes this zero in practice;
/// this exists only as the Guardians' belt-and-braces check against
/// duplicate queue entries.
pub fn duplicate_participant_count(conn: &mut PgConnection) -> MatchingResult<i64> {
    use diesel::dsl::sql;
    use diesel::sql_types::BigInt;

    let count = queue_entries::table
        .select(sql::<BigInt>("count(*) - count(distinct participant_id)"))
        .first::<i64>(conn)?;
    Ok(count)
}

pub fn queue_size(conn: &mut PgConnection) -> MatchingResult<i64> {
    let count = queue_entries::table.count().get_result(conn)?;
    Ok(count)
}

/// All entries whose wait time has crossed an expansion-stage threshold but
/// whose `expansion_stage` hasn't caught up yet. Used by the Guardians'
/// "enforce expansion stages by wait time" sweep.
pub fn stale_expansion_candidates(
    conn: &mut PgConnection,
    stage_0_threshold: chrono::DateTime<chrono::Utc>,
) -> MatchingResult<Vec<QueueEntry>> {
    let entries = queue_entries::table
        .filter(queue_entries::joined_at.lt(stage_0_threshold))
        .filter(queue_entries::expansion_stage.lt(3))
        .load::<QueueEntry>(conn)?;
    Ok(entries)
}
