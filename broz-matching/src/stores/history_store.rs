//! Permanent mutual-accept pairs and recent-pair
//! cooldown entries, both keyed in canonical order.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::errors::MatchingResult;
use crate::models::{canonical_pair, NewHistoryCooldown, NewHistoryMutualAccept};
use crate::schema::{history_cooldown, history_mutual_accept};

pub fn was_mutual_accept(conn: &mut PgConnection, a: Uuid, b: Uuid) -> MatchingResult<bool> {
    let (lo, hi) = canonical_pair(a, b);
    let exists = diesel::select(diesel::dsl::exists(
        history_mutual_accept::table
            .filter(history_mutual_accept::participant_a.eq(lo))
            .filter(history_mutual_accept::participant_b.eq(hi)),
    ))
    .get_result(conn)?;
    Ok(exists)
}

pub fn within_cooldown(
    conn: &mut PgConnection,
    a: Uuid,
    b: Uuid,
    window_ms: i64,
) -> MatchingResult<bool> {
    let (lo, hi) = canonical_pair(a, b);
    let cutoff = chrono::Utc::now() - chrono::Duration::milliseconds(window_ms);
    let exists = diesel::select(diesel::dsl::exists(
        history_cooldown::table
            .filter(history_cooldown::participant_a.eq(lo))
            .filter(history_cooldown::participant_b.eq(hi))
            .filter(history_cooldown::created_at.gt(cutoff)),
    ))
    .get_result(conn)?;
    Ok(exists)
}

/// Idempotent insert in canonical order; a second mutual-accept for the
/// same pair is a no-op (the pair is already permanently barred).
pub fn record_mutual_accept(conn: &mut PgConnection, a: Uuid, b: Uuid) -> MatchingResult<()> {
    let (lo, hi) = canonical_pair(a, b);
    diesel::insert_into(history_mutual_accept::table)
        .values(&NewHistoryMutualAccept { participant_a: lo, participant_b: hi })
        .on_conflict((history_mutual_accept::participant_a, history_mutual_accept::participant_b))
        .do_nothing()
        .execute(conn)?;
    Ok(())
}

/// Idempotent insert in canonical order, refreshing `created_at` on
/// conflict so the cooldown window restarts from the most recent outcome.
pub fn record_pairing(conn: &mut PgConnection, a: Uuid, b: Uuid) -> MatchingResult<()> {
    let (lo, hi) = canonical_pair(a, b);
    diesel::insert_into(history_cooldown::table)
        .values(&NewHistoryCooldown { participant_a: lo, participant_b: hi })
        .on_conflict((history_cooldown::participant_a, history_cooldown::participant_b))
        .do_update()
        .set(history_cooldown::created_at.eq(chrono::Utc::now()))
        .execute(conn)?;
    Ok(())
}

/// Deletes cooldown entries older than `retention_ms`, as part of the
/// Guardians' periodic cleanup.
pub fn prune_cooldown_older_than(conn: &mut PgConnection, retention_ms: i64) -> MatchingResult<usize> {
    let cutoff = chrono::Utc::now() - chrono::Duration::milliseconds(retention_ms);
    let deleted = diesel::delete(history_cooldown::table.filter(history_cooldown::created_at.lt(cutoff)))
        .execute(conn)?;
    Ok(deleted)
}
