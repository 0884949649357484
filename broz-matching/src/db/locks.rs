//! Postgres advisory-lock helpers.
//!
//! Diesel has no native wrapper for `pg_try_advisory_lock`, so these go
//! through `sql_query`. Locks are keyed by hashing a namespaced string (a
//! participant id, or `match:<uuid>`) down to a single `bigint` via
//! Postgres's own `hashtext`, giving named advisory locks without needing
//! a second integer-id scheme.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Text};
use uuid::Uuid;

#[derive(QueryableByName)]
struct LockResult {
    #[diesel(sql_type = Bool)]
    locked: bool,
}

fn lock_key_for_participant(id: Uuid) -> String {
    format!("participant:{id}")
}

fn lock_key_for_match(id: Uuid) -> String {
    format!("match:{id}")
}

/// Attempt to acquire a session-level advisory lock for `key`. Non-blocking:
/// returns `false` immediately if already held elsewhere.
fn try_lock(conn: &mut PgConnection, key: &str) -> QueryResult<bool> {
    let row: LockResult = diesel::sql_query(
        "SELECT pg_try_advisory_lock(hashtext($1)::bigint) AS locked",
    )
    .bind::<Text, _>(key)
    .get_result(conn)?;
    Ok(row.locked)
}

fn unlock(conn: &mut PgConnection, key: &str) -> QueryResult<bool> {
    let row: LockResult = diesel::sql_query(
        "SELECT pg_advisory_unlock(hashtext($1)::bigint) AS locked",
    )
    .bind::<Text, _>(key)
    .get_result(conn)?;
    Ok(row.locked)
}

pub fn try_lock_participant(conn: &mut PgConnection, id: Uuid) -> QueryResult<bool> {
    try_lock(conn, &lock_key_for_participant(id))
}

pub fn unlock_participant(conn: &mut PgConnection, id: Uuid) -> QueryResult<bool> {
    unlock(conn, &lock_key_for_participant(id))
}

pub fn try_lock_match(conn: &mut PgConnection, id: Uuid) -> QueryResult<bool> {
    try_lock(conn, &lock_key_for_match(id))
}

pub fn unlock_match(conn: &mut PgConnection, id: Uuid) -> QueryResult<bool> {
    unlock(conn, &lock_key_for_match(id))
}

fn lock_key_for_cycle(id: Uuid) -> String {
    format!("cycle:{id}")
}

/// The orchestrator's per-participant cycle lock, preventing concurrent
/// cycles from competing destructively for the same participant. Distinct
/// key namespace from the pair-creator's participant lock so the two
/// don't contend with each other.
pub fn try_lock_cycle(conn: &mut PgConnection, participant_id: Uuid) -> QueryResult<bool> {
    try_lock(conn, &lock_key_for_cycle(participant_id))
}

pub fn unlock_cycle(conn: &mut PgConnection, participant_id: Uuid) -> QueryResult<bool> {
    unlock(conn, &lock_key_for_cycle(participant_id))
}

fn lock_key_for_named(name: &str) -> String {
    format!("named:{name}")
}

/// A generically-keyed advisory lock for one-off singleton sections, e.g.
/// the Guardian sweep, where concurrent instances must not repeat each
/// other's work. Unlike the participant/match/cycle locks above, the
/// caller picks the key directly rather than deriving it from an id.
pub fn try_lock_named(conn: &mut PgConnection, name: &str) -> QueryResult<bool> {
    try_lock(conn, &lock_key_for_named(name))
}

pub fn unlock_named(conn: &mut PgConnection, name: &str) -> QueryResult<bool> {
    unlock(conn, &lock_key_for_named(name))
}

/// RAII guard releasing a match-level advisory lock on drop. Used by the
/// voting engine so that every exit path — success, error, or panic during
/// the transaction — releases the lock.
///
/// Callers needing the underlying connection while the lock is held go
/// through `conn()` rather than the original `&mut PgConnection` they
/// passed to `acquire` — holding both at once would be two live mutable
/// borrows of the same connection, since the guard's `Drop` impl keeps its
/// borrow alive for the guard's whole lifetime.
pub struct MatchLockGuard<'a> {
    conn: &'a mut PgConnection,
    match_id: Uuid,
    held: bool,
}

impl<'a> MatchLockGuard<'a> {
    pub fn acquire(conn: &'a mut PgConnection, match_id: Uuid) -> QueryResult<Option<Self>> {
        let acquired = try_lock_match(conn, match_id)?;
        if !acquired {
            return Ok(None);
        }
        Ok(Some(Self {
            conn,
            match_id,
            held: true,
        }))
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        self.conn
    }
}

impl Drop for MatchLockGuard<'_> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = unlock_match(self.conn, self.match_id) {
                tracing::error!(match_id = %self.match_id, error = %e, "failed to release match advisory lock");
            }
        }
    }
}

/// RAII guard releasing the orchestrator's per-participant cycle lock on
/// drop. Mirrors `MatchLockGuard` exactly; see its docs for why callers
/// must route connection use through `conn()` instead of reusing the
/// original reference directly.
pub struct CycleLockGuard<'a> {
    conn: &'a mut PgConnection,
    participant_id: Uuid,
    held: bool,
}

impl<'a> CycleLockGuard<'a> {
    pub fn acquire(conn: &'a mut PgConnection, participant_id: Uuid) -> QueryResult<Option<Self>> {
        let acquired = try_lock_cycle(conn, participant_id)?;
        if !acquired {
            return Ok(None);
        }
        Ok(Some(Self {
            conn,
            participant_id,
            held: true,
        }))
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        self.conn
    }
}

impl Drop for CycleLockGuard<'_> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = unlock_cycle(self.conn, self.participant_id) {
                tracing::error!(participant_id = %self.participant_id, error = %e, "failed to release cycle advisory lock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_are_namespaced_per_kind_and_stable() {
        let id = Uuid::nil();
        assert_eq!(lock_key_for_participant(id), "participant:00000000-0000-0000-0000-000000000000");
        assert_eq!(lock_key_for_match(id), "match:00000000-0000-0000-0000-000000000000");
        assert_eq!(lock_key_for_cycle(id), "cycle:00000000-0000-0000-0000-000000000000");
        assert_eq!(lock_key_for_named("guardian_sweep"), "named:guardian_sweep");
    }

    #[test]
    fn cycle_and_participant_keys_never_collide_for_the_same_id() {
        let id = Uuid::new_v4();
        assert_ne!(lock_key_for_cycle(id), lock_key_for_participant(id));
        assert_ne!(lock_key_for_cycle(id), lock_key_for_match(id));
    }
}
