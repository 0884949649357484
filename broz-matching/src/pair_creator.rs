//! The sole authority that writes new matches. Every step runs against one
//! pooled connection so the session-level advisory locks taken early on
//! stay held for the whole protocol; callers must not hand this function a
//! connection they intend to reuse concurrently elsewhere.

use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use broz_shared::clients::rabbitmq::RabbitMQClient;

use crate::config::AppConfig;
use crate::db::locks;
use crate::errors::{MatchingError, MatchingResult};
use crate::events::publisher;
use crate::models::canonical_pair;
use crate::profile::{Gender, Profile, ProfileDirectory};
use crate::selector::Tier;
use crate::state_machine::{self, ParticipantState};
use crate::stores::{history_store, match_store, queue_store};

pub struct PairOutcome {
    pub match_id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
}

/// Attempts to pair `a` and `b`. Returns `Ok(None)` for every expected,
/// retryable failure to pair (lock contention, a participant no longer
/// matchable, a history/cooldown/gender violation) — only genuinely
/// unexpected failures surface as `Err`.
pub async fn create_pair(
    conn: &mut PgConnection,
    directory: &dyn ProfileDirectory,
    config: &AppConfig,
    rabbitmq: &RabbitMQClient,
    a: Uuid,
    b: Uuid,
    tier: Tier,
) -> MatchingResult<Option<PairOutcome>> {
    let (lo, hi) = canonical_pair(a, b);

    if acquire_pair_locks(conn, lo, hi, config).await?.is_none() {
        return Ok(None);
    }

    if !both_matchable(conn, lo, hi)? {
        release_pair_locks(conn, lo, hi);
        return Ok(None);
    }

    let profile_lo = match directory.get_profile(lo).await {
        Ok(p) => p,
        Err(_) => {
            release_pair_locks(conn, lo, hi);
            return Ok(None);
        }
    };
    let profile_hi = match directory.get_profile(hi).await {
        Ok(p) => p,
        Err(_) => {
            release_pair_locks(conn, lo, hi);
            return Ok(None);
        }
    };

    if !revalidate(conn, &profile_lo, &profile_hi, tier, config.cooldown_ms as i64)? {
        release_pair_locks(conn, lo, hi);
        return Ok(None);
    }

    let outcome = commit_pair(conn, lo, hi, tier);
    release_pair_locks(conn, lo, hi);

    if let Ok(Some(ref paired)) = outcome {
        let rabbitmq = rabbitmq.clone();
        let match_id = paired.match_id;
        let tier_num: i16 = match tier {
            Tier::One => 1,
            Tier::Two => 2,
            Tier::Three => 3,
        };
        tokio::spawn(async move {
            publisher::publish_match_created(&rabbitmq, match_id, lo, hi, tier_num).await;
            publisher::publish_participant_state_changed(&rabbitmq, lo, "spin_active", "paired", Some(match_id)).await;
            publisher::publish_participant_state_changed(&rabbitmq, hi, "spin_active", "paired", Some(match_id)).await;
        });
    }

    outcome
}

fn both_matchable(conn: &mut PgConnection, lo: Uuid, hi: Uuid) -> MatchingResult<bool> {
    use crate::schema::participants::dsl::*;

    let states: Vec<String> = participants
        .filter(id.eq_any([lo, hi]))
        .select(state)
        .load(conn)?;

    if states.len() != 2 {
        return Ok(false);
    }
    for s in &states {
        if !state_machine::is_matchable(s)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn revalidate(
    conn: &mut PgConnection,
    a: &Profile,
    b: &Profile,
    tier: Tier,
    cooldown_ms: i64,
) -> MatchingResult<bool> {
    if !Gender::compatible(a, b) {
        return Ok(false);
    }
    if history_store::was_mutual_accept(conn, a.participant_id, b.participant_id)? {
        return Ok(false);
    }
    let tier_allows_cooldown = matches!(tier, Tier::Three);
    if !tier_allows_cooldown
        && history_store::within_cooldown(conn, a.participant_id, b.participant_id, cooldown_ms)?
    {
        return Ok(false);
    }
    Ok(true)
}

/// Steps 5–7 of the protocol, run as one Postgres transaction so a
/// mismatched state-machine transition rolls back the match insert too.
fn commit_pair(conn: &mut PgConnection, lo: Uuid, hi: Uuid, tier: Tier) -> MatchingResult<Option<PairOutcome>> {
    let tier_num: i16 = match tier {
        Tier::One => 1,
        Tier::Two => 2,
        Tier::Three => 3,
    };

    let attempt = conn.transaction::<Option<PairOutcome>, MatchingError, _>(|conn| {
        let match_id = match_store::create_if_absent(conn, lo, hi, tier_num)?;

        let a_result = state_machine::transition(
            conn,
            lo,
            ParticipantState::Paired,
            Some(Some(match_id)),
            "pair_created",
        );
        let b_result = state_machine::transition(
            conn,
            hi,
            ParticipantState::Paired,
            Some(Some(match_id)),
            "pair_created",
        );

        if a_result.is_err() || b_result.is_err() {
            // Roll the whole transaction back; the caller sees this as a
            // `None` outcome rather than a hard error, since a losing race
            // against another orchestrator cycle is expected.
            return Err(MatchingError::Transient(format!(
                "state transition mismatch pairing {lo}/{hi}: a={:?} b={:?}",
                a_result.is_ok(),
                b_result.is_ok()
            )));
        }

        queue_store::clear_boosts(conn, lo)?;
        queue_store::clear_boosts(conn, hi)?;
        queue_store::remove(conn, lo)?;
        queue_store::remove(conn, hi)?;
        history_store::record_pairing(conn, lo, hi)?;

        Ok(Some(PairOutcome {
            match_id,
            participant_a: lo,
            participant_b: hi,
        }))
    });

    match attempt {
        Ok(outcome) => Ok(outcome),
        Err(MatchingError::Transient(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Acquires both participant locks in canonical order with exponential
/// backoff. Returns `None` (after releasing any lock it did manage to
/// take) if retries are exhausted.
async fn acquire_pair_locks(
    conn: &mut PgConnection,
    lo: Uuid,
    hi: Uuid,
    config: &AppConfig,
) -> MatchingResult<Option<()>> {
    if !acquire_with_backoff(conn, lo, config).await? {
        return Ok(None);
    }
    if !acquire_with_backoff(conn, hi, config).await? {
        locks::unlock_participant(conn, lo).map_err(MatchingError::from)?;
        return Ok(None);
    }
    Ok(Some(()))
}

fn release_pair_locks(conn: &mut PgConnection, lo: Uuid, hi: Uuid) {
    if let Err(e) = locks::unlock_participant(conn, hi) {
        tracing::error!(participant_id = %hi, error = %e, "failed to release pair-creator lock");
    }
    if let Err(e) = locks::unlock_participant(conn, lo) {
        tracing::error!(participant_id = %lo, error = %e, "failed to release pair-creator lock");
    }
}

async fn acquire_with_backoff(conn: &mut PgConnection, id: Uuid, config: &AppConfig) -> MatchingResult<bool> {
    let mut backoff = config.pair_lock_backoff_ms_initial;
    for attempt in 0..config.pair_lock_retries {
        if locks::try_lock_participant(conn, id).map_err(MatchingError::from)? {
            return Ok(true);
        }
        if attempt + 1 == config.pair_lock_retries {
            break;
        }
        let jitter = rand::random::<u64>() % (backoff / 2 + 1);
        tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
        backoff = (backoff * 2).min(config.pair_lock_backoff_ms_cap);
    }
    Ok(false)
}
