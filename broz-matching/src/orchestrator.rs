//! The per-participant matching loop across tiers with retries, triggered
//! either directly by a spin request or by the periodic cycle spawned from
//! `main`, following the same `tokio::spawn` + `interval` shape used
//! elsewhere in this workspace for periodic background work.

use std::sync::Arc;
use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use broz_shared::clients::rabbitmq::RabbitMQClient;

use crate::config::AppConfig;
use crate::db::locks::CycleLockGuard;
use crate::db::DbPool;
use crate::errors::{MatchingError, MatchingResult};
use crate::fairness::{self, ExpansionStage, FairnessInputs};
use crate::pair_creator::{self, PairOutcome};
use crate::profile::{Preferences, Profile, ProfileDirectory};
use crate::selector::{self, Tier};
use crate::stores::queue_store;

const TIER_ORDER: [Tier; 3] = [Tier::One, Tier::Two, Tier::Three];
const TIER_SLEEP: Duration = Duration::from_millis(100);

/// Attempts to match a single participant right now, trying all three
/// tiers in order. Used both by the `spin` route handler (immediate
/// attempt) and by the periodic cycle (one call per matchable participant).
///
/// Holds the cycle-level advisory lock on `participant_id` for the whole
/// attempt (spec §5's orchestrator-cycle-lock requirement), via one pooled
/// connection kept checked out for as long as the lock is held — releasing
/// the connection back to the pool before unlocking would just hand the
/// still-held lock to whoever gets that connection next. A participant
/// already mid-attempt (the `spin` handler and a periodic cycle tick racing
/// each other) is reported as "no match this attempt" rather than blocking.
pub async fn attempt_match_for_participant(
    pool: &DbPool,
    directory: &dyn ProfileDirectory,
    config: &AppConfig,
    rabbitmq: &RabbitMQClient,
    participant_id: Uuid,
) -> MatchingResult<Option<PairOutcome>> {
    let self_profile = directory.get_profile(participant_id).await?;

    let mut conn = pool.get().map_err(pool_error)?;
    let Some(mut cycle_lock) = CycleLockGuard::acquire(&mut conn, participant_id).map_err(MatchingError::from)? else {
        tracing::debug!(participant_id = %participant_id, "cycle already in progress for this participant, skipping");
        return Ok(None);
    };

    refresh_fairness(cycle_lock.conn(), &self_profile.preferences, participant_id, config)?;

    let wait_ms = match queue_store::find(cycle_lock.conn(), participant_id)? {
        Some(entry) => (chrono::Utc::now() - entry.joined_at).num_milliseconds().max(0),
        None => return Ok(None),
    };
    let wait_based_stage = ExpansionStage::for_wait(
        wait_ms,
        (config.expand_stage_thresholds_ms.0 as i64, config.expand_stage_thresholds_ms.1 as i64),
    );

    let mut attempted: Vec<Uuid> = Vec::new();

    for tier in TIER_ORDER {
        if !still_matchable(cycle_lock.conn(), participant_id)? {
            tracing::debug!(participant_id = %participant_id, "orchestration cancelled at cooperative checkpoint");
            return Ok(None);
        }

        for _ in 0..config.tier_candidate_cap {
            let candidate = selector::select(
                cycle_lock.conn(),
                directory,
                config,
                participant_id,
                &self_profile,
                wait_based_stage,
                tier,
                config.cooldown_ms as i64,
                &attempted,
            )
            .await?;

            let Some(candidate_id) = candidate else {
                break;
            };
            attempted.push(candidate_id);

            if let Some(outcome) =
                try_pair_with_retries(cycle_lock.conn(), directory, config, rabbitmq, participant_id, candidate_id, tier).await?
            {
                return Ok(Some(outcome));
            }
        }

        tokio::time::sleep(TIER_SLEEP).await;
    }

    tracing::warn!(
        participant_id = %participant_id,
        attempts = attempted.len(),
        "orchestrator cycle observed the candidate pool without pairing"
    );
    Ok(None)
}

async fn try_pair_with_retries(
    conn: &mut PgConnection,
    directory: &dyn ProfileDirectory,
    config: &AppConfig,
    rabbitmq: &RabbitMQClient,
    self_id: Uuid,
    candidate_id: Uuid,
    tier: Tier,
) -> MatchingResult<Option<PairOutcome>> {
    for attempt in 0..config.pair_creator_candidate_retries {
        match pair_creator::create_pair(conn, directory, config, rabbitmq, self_id, candidate_id, tier).await? {
            Some(outcome) => return Ok(Some(outcome)),
            None if attempt + 1 == config.pair_creator_candidate_retries => return Ok(None),
            None => continue,
        }
    }
    Ok(None)
}

fn still_matchable(conn: &mut PgConnection, participant_id: Uuid) -> MatchingResult<bool> {
    use crate::schema::participants::dsl::*;

    let current: Option<String> = participants
        .find(participant_id)
        .select(state)
        .first(conn)
        .optional()?;
    match current {
        Some(s) => crate::state_machine::is_matchable(&s),
        None => Ok(false),
    }
}

fn refresh_fairness(
    conn: &mut PgConnection,
    preferences: &Preferences,
    participant_id: Uuid,
    config: &AppConfig,
) -> MatchingResult<()> {
    let Some(entry) = queue_store::find(conn, participant_id)? else {
        return Ok(());
    };

    let wait_seconds = (chrono::Utc::now() - entry.joined_at).num_seconds().max(0) as f64;
    let queue_size = queue_store::queue_size(conn)?;
    let wait_ms = (wait_seconds * 1000.0) as i64;
    let stage = ExpansionStage::for_wait(
        wait_ms,
        (config.expand_stage_thresholds_ms.0 as i64, config.expand_stage_thresholds_ms.1 as i64),
    );

    let score = fairness::fairness_score(FairnessInputs {
        wait_seconds,
        skip_count: entry.skip_count,
        narrowness: preferences.narrowness(),
        queue_size,
        accumulated_boosts: entry.accumulated_boosts,
    });

    queue_store::update_fairness(conn, participant_id, score, stage.0)
}

fn pool_error(e: impl std::fmt::Display) -> MatchingError {
    MatchingError::Transient(format!("db pool: {e}"))
}

/// Spawns the periodic orchestrator cycle as a background task, mirroring
/// the reference stack's hourly aggregation task.
pub fn spawn_periodic_cycle(
    pool: DbPool,
    directory: Arc<dyn ProfileDirectory>,
    config: Arc<AppConfig>,
    rabbitmq: RabbitMQClient,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(config.orchestrator_interval_ms));

        loop {
            interval.tick().await;
            if let Err(e) = run_cycle(&pool, directory.as_ref(), &config, &rabbitmq).await {
                tracing::error!(error = %e, "orchestrator cycle failed");
            }
        }
    });
}

/// One periodic cycle: attempts to match every currently matchable
/// participant, bounded by the global attempt cap `orchestrator_cycle_attempt_cap`.
/// Participants carrying a manually-unresolved `Fatal` are skipped until an
/// operator clears the suppression.
async fn run_cycle(
    pool: &DbPool,
    directory: &dyn ProfileDirectory,
    config: &AppConfig,
    rabbitmq: &RabbitMQClient,
) -> MatchingResult<()> {
    use crate::schema::participants::dsl::*;

    let candidates: Vec<Uuid> = {
        let mut conn = pool.get().map_err(pool_error)?;
        participants
            .filter(state.eq_any(["spin_active", "queue_waiting"]))
            .filter(fatal_suppressed.eq(false))
            .order(updated_at.asc())
            .limit(config.orchestrator_cycle_attempt_cap as i64)
            .select(id)
            .load(&mut conn)?
    };

    let mut paired = 0usize;
    for participant_id in candidates {
        match attempt_match_for_participant(pool, directory, config, rabbitmq, participant_id).await {
            Ok(Some(_)) => paired += 1,
            Ok(None) => {}
            Err(MatchingError::Fatal(msg)) => {
                tracing::error!(participant_id = %participant_id, reason = %msg, "suppressing participant after fatal orchestrator error");
                if let Ok(mut conn) = pool.get() {
                    if let Err(e) = crate::state_machine::suppress_fatal(&mut conn, participant_id) {
                        tracing::error!(participant_id = %participant_id, error = %e, "failed to persist fatal suppression");
                    }
                }
            }
            Err(e) => tracing::error!(participant_id = %participant_id, error = %e, "orchestrator attempt failed"),
        }
    }

    tracing::debug!(paired, "orchestrator cycle complete");
    Ok(())
}
