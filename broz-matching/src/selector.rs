//! Picks the best counterpart for a participant under a given tier.
//! Read-only except for the advisory scan locks it takes while walking
//! the queue's priority index; it never writes a match or mutates a
//! queue entry.

use diesel::pg::PgConnection;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::MatchingResult;
use crate::fairness::{self, ExpansionStage, PriorityInputs, WidenedPreferences};
use crate::models::QueueEntry;
use crate::profile::{Gender, Preferences, Profile, ProfileDirectory};
use crate::stores::{history_store, queue_store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    One,
    Two,
    Three,
}

impl Tier {
    fn allows_cooldown(self) -> bool {
        matches!(self, Tier::Three)
    }

    fn is_guaranteed(self) -> bool {
        matches!(self, Tier::Three)
    }
}

/// Resolves this tier's effective expansion stage for filtering purposes.
/// Tiers 1/2 track the participant's own wait-based expansion stage; tier
/// 3 always filters as if fully widened, since it is the guaranteed-match
/// fallback regardless of how long the participant has waited.
fn stage_for_tier(tier: Tier, wait_based: ExpansionStage) -> ExpansionStage {
    match tier {
        Tier::One => ExpansionStage::EXACT,
        Tier::Two => wait_based.max(ExpansionStage::WIDE),
        Tier::Three => ExpansionStage::GUARANTEED,
    }
}

fn within_bounds(widened: &WidenedPreferences, candidate: &Profile, self_profile: &Profile) -> bool {
    if widened.guaranteed {
        return true;
    }
    if candidate.age < widened.age_min || candidate.age > widened.age_max {
        return false;
    }
    if let Some(max_distance) = widened.max_distance {
        let distance = self_profile
            .preferences
            .max_distance
            .map(|_| coarse_distance(&self_profile.coarse_location, &candidate.coarse_location))
            .unwrap_or(0.0);
        if distance > max_distance {
            return false;
        }
    }
    true
}

/// Coarse-location distance proxy: the directory only ever hands back a
/// coarse location string (country/region code), so "distance" here is a
/// cheap proximity heuristic, not geodesic distance.
fn coarse_distance(a: &str, b: &str) -> f64 {
    if a == b {
        0.0
    } else {
        500.0
    }
}

fn distance_affinity(a: &str, b: &str) -> f64 {
    1.0 - (coarse_distance(a, b) / 500.0)
}

fn compatibility_score(a: &Profile, b: &Profile) -> f64 {
    let age_gap = (a.age - b.age).unsigned_abs() as f64;
    (1.0 - (age_gap / 60.0)).max(0.0)
}

async fn eligible(
    conn: &mut PgConnection,
    directory: &dyn ProfileDirectory,
    self_profile: &Profile,
    tier: Tier,
    stage: ExpansionStage,
    cooldown_window_ms: i64,
    candidate_id: Uuid,
) -> MatchingResult<Option<(Profile, WidenedPreferences)>> {
    let candidate_profile = match directory.get_profile(candidate_id).await {
        Ok(p) => p,
        Err(_) => return Ok(None),
    };

    if !Gender::compatible(self_profile, &candidate_profile) {
        return Ok(None);
    }

    if history_store::was_mutual_accept(conn, self_profile.participant_id, candidate_id)? {
        return Ok(None);
    }

    if !tier.allows_cooldown()
        && history_store::within_cooldown(
            conn,
            self_profile.participant_id,
            candidate_id,
            cooldown_window_ms,
        )?
    {
        return Ok(None);
    }

    let widened = fairness::widen(&self_profile.preferences, stage);
    if !within_bounds(&widened, &candidate_profile, self_profile) {
        return Ok(None);
    }

    Ok(Some((candidate_profile, widened)))
}

/// Picks the best counterpart for `self_id` under `tier`, or `None` if no
/// eligible candidate exists among the scanned entries.
///
/// `cooldown_window_ms` is threaded in rather than read from config so
/// callers (and tests) can control it without constructing a full
/// `AppConfig`.
#[allow(clippy::too_many_arguments)]
pub async fn select(
    conn: &mut PgConnection,
    directory: &dyn ProfileDirectory,
    config: &AppConfig,
    self_id: Uuid,
    self_profile: &Profile,
    wait_based_stage: ExpansionStage,
    tier: Tier,
    cooldown_window_ms: i64,
    already_attempted: &[Uuid],
) -> MatchingResult<Option<Uuid>> {
    let stage = stage_for_tier(tier, wait_based_stage);
    let candidates = queue_store::scan_priority_order(conn, self_id, config.tier_scan_cap as i64)?;

    let mut best: Option<(Uuid, f64)> = None;

    for entry in candidates.iter().filter(|e| !already_attempted.contains(&e.participant_id)) {
        let Some((candidate_profile, _widened)) = eligible(
            conn,
            directory,
            self_profile,
            tier,
            stage,
            cooldown_window_ms,
            entry.participant_id,
        )
        .await?
        else {
            continue;
        };

        let priority = score_candidate(entry, self_profile, &candidate_profile, cooldown_window_ms);

        best = match best {
            Some((_, best_priority)) if best_priority >= priority => best,
            _ => Some((entry.participant_id, priority)),
        };
    }

    if tier.is_guaranteed() && best.is_none() {
        // Guaranteed-match fallback: re-scan ignoring everything except
        // gender compatibility, block list, and permanent history. Uses
        // its own unbounded, non-locking scan rather than `candidates` —
        // that scan is capped at `tier_scan_cap` and takes `FOR UPDATE
        // SKIP LOCKED`, either of which could hide an eligible candidate
        // from the one tier whose entire purpose is to never come up
        // empty.
        let fallback_candidates = queue_store::scan_all_matchable(conn, self_id)?;
        for entry in fallback_candidates.iter().filter(|e| !already_attempted.contains(&e.participant_id)) {
            let candidate_profile = match directory.get_profile(entry.participant_id).await {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !Gender::compatible(self_profile, &candidate_profile) {
                continue;
            }
            if history_store::was_mutual_accept(conn, self_id, entry.participant_id)? {
                continue;
            }
            let priority = score_candidate(entry, self_profile, &candidate_profile, cooldown_window_ms);
            best = match best {
                Some((_, best_priority)) if best_priority >= priority => best,
                _ => Some((entry.participant_id, priority)),
            };
        }
    }

    Ok(best.map(|(id, _)| id))
}

fn score_candidate(
    entry: &QueueEntry,
    self_profile: &Profile,
    candidate_profile: &Profile,
    _cooldown_window_ms: i64,
) -> f64 {
    let wait_seconds = (chrono::Utc::now() - entry.joined_at).num_seconds().max(0) as f64;
    fairness::priority(PriorityInputs {
        fairness: entry.fairness_score,
        wait_seconds,
        compatibility: compatibility_score(self_profile, candidate_profile),
        distance_affinity: distance_affinity(&self_profile.coarse_location, &candidate_profile.coarse_location),
    })
}

/// Used by `select` callers that need the plain `Preferences::narrowness`
/// value without constructing the full fairness pipeline (kept here so
/// importers of `selector` don't also need to import `profile` directly).
pub fn narrowness(prefs: &Preferences) -> f64 {
    prefs.narrowness()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_one_never_widens_beyond_exact() {
        assert_eq!(stage_for_tier(Tier::One, ExpansionStage::GUARANTEED), ExpansionStage::EXACT);
        assert_eq!(stage_for_tier(Tier::One, ExpansionStage::WIDER), ExpansionStage::EXACT);
    }

    #[test]
    fn tier_two_tracks_wait_based_stage_but_floors_at_wide() {
        assert_eq!(stage_for_tier(Tier::Two, ExpansionStage::EXACT), ExpansionStage::WIDE);
        assert_eq!(stage_for_tier(Tier::Two, ExpansionStage::WIDE), ExpansionStage::WIDE);
        assert_eq!(stage_for_tier(Tier::Two, ExpansionStage::WIDER), ExpansionStage::WIDER);
    }

    #[test]
    fn tier_three_always_guaranteed_regardless_of_wait() {
        assert_eq!(stage_for_tier(Tier::Three, ExpansionStage::EXACT), ExpansionStage::GUARANTEED);
    }

    #[test]
    fn only_tier_three_allows_cooldown_or_is_guaranteed() {
        assert!(!Tier::One.allows_cooldown());
        assert!(!Tier::Two.allows_cooldown());
        assert!(Tier::Three.allows_cooldown());

        assert!(!Tier::One.is_guaranteed());
        assert!(!Tier::Two.is_guaranteed());
        assert!(Tier::Three.is_guaranteed());
    }

    #[test]
    fn guaranteed_widened_preferences_bypass_all_bounds() {
        let widened = WidenedPreferences {
            age_min: 40,
            age_max: 41,
            max_distance: Some(1.0),
            accept_stale_liveness: true,
            guaranteed: true,
        };
        let self_profile = profile_fixture(30, "US");
        let candidate = profile_fixture(80, "JP");
        assert!(within_bounds(&widened, &candidate, &self_profile));
    }

    #[test]
    fn age_outside_widened_bounds_is_rejected() {
        let widened = WidenedPreferences {
            age_min: 25,
            age_max: 35,
            max_distance: None,
            accept_stale_liveness: false,
            guaranteed: false,
        };
        let self_profile = profile_fixture(30, "US");
        let too_young = profile_fixture(20, "US");
        let too_old = profile_fixture(40, "US");
        let in_range = profile_fixture(30, "US");
        assert!(!within_bounds(&widened, &too_young, &self_profile));
        assert!(!within_bounds(&widened, &too_old, &self_profile));
        assert!(within_bounds(&widened, &in_range, &self_profile));
    }

    #[test]
    fn coarse_distance_is_zero_within_same_region_and_fixed_otherwise() {
        assert_eq!(coarse_distance("US", "US"), 0.0);
        assert_eq!(coarse_distance("US", "JP"), 500.0);
        assert_eq!(distance_affinity("US", "US"), 1.0);
        assert_eq!(distance_affinity("US", "JP"), 0.0);
    }

    #[test]
    fn compatibility_score_decreases_with_age_gap_and_floors_at_zero() {
        let a = profile_fixture(30, "US");
        assert_eq!(compatibility_score(&a, &profile_fixture(30, "US")), 1.0);
        assert!(compatibility_score(&a, &profile_fixture(50, "US")) < 1.0);
        assert_eq!(compatibility_score(&a, &profile_fixture(100, "US")), 0.0);
    }

    fn profile_fixture(age: i32, coarse_location: &str) -> Profile {
        use crate::profile::{Gender, Preferences};

        Profile {
            participant_id: Uuid::new_v4(),
            gender: Gender::NonBinary,
            age,
            coarse_location: coarse_location.to_string(),
            preferences: Preferences {
                gender_preference: vec![Gender::NonBinary],
                age_min: 18,
                age_max: 99,
                max_distance: None,
            },
        }
    }
}
