//! Pure scoring functions consumed by the selector and by the guardians'
//! periodic rescoring sweep. Nothing in this module touches the database;
//! callers fetch the inputs and write the results back through
//! `stores::queue_store`.

use crate::profile::Preferences;

/// Caps and coefficients for the scoring formulas below. None of these are configurable —
/// only `fairness_boost_value` (the queue-store boost applied on a
/// partner's soft-offline) is, and `config::AppConfig::load` refuses to
/// start if that one drifts from 10.
const BASE_WAIT_CAP: f64 = 500.0;
const BASE_WAIT_DIVISOR: f64 = 10.0;
const SKIP_PENALTY_PER_SKIP: f64 = 50.0;
const SKIP_PENALTY_CAP: f64 = 300.0;
const NARROW_PREFERENCE_WEIGHT: f64 = 100.0;
const DENSITY_BASELINE: f64 = 10.0;
const DENSITY_WEIGHT: f64 = 10.0;

/// Inputs to the fairness score for a single queue entry, independent of
/// any particular candidate.
#[derive(Debug, Clone, Copy)]
pub struct FairnessInputs {
    pub wait_seconds: f64,
    pub skip_count: i32,
    pub narrowness: f64,
    pub queue_size: i64,
    pub accumulated_boosts: f64,
}

/// `fairness = base_wait + skip_penalty + narrow_preference_penalty +
/// density_boost + accumulated_boosts`.
pub fn fairness_score(inputs: FairnessInputs) -> f64 {
    let base_wait = (inputs.wait_seconds / BASE_WAIT_DIVISOR).min(BASE_WAIT_CAP);
    let skip_penalty = (inputs.skip_count as f64 * SKIP_PENALTY_PER_SKIP).min(SKIP_PENALTY_CAP);
    let narrow_preference_penalty = (1.0 - inputs.narrowness) * NARROW_PREFERENCE_WEIGHT;
    let density_boost = ((DENSITY_BASELINE - inputs.queue_size as f64) * DENSITY_WEIGHT).max(0.0);

    base_wait + skip_penalty + narrow_preference_penalty + density_boost + inputs.accumulated_boosts
}

/// Per-candidate inputs to the priority ranking used to pick among
/// same-tier candidates.
#[derive(Debug, Clone, Copy)]
pub struct PriorityInputs {
    pub fairness: f64,
    pub wait_seconds: f64,
    pub compatibility: f64,
    pub distance_affinity: f64,
}

/// `priority = fairness*1000 + wait_seconds*10 + compatibility*100 +
/// distance_affinity*10`. Higher is better; ties break on
/// `joined_at` ascending then participant id, both handled by the caller's
/// sort, not here.
pub fn priority(inputs: PriorityInputs) -> f64 {
    inputs.fairness * 1000.0
        + inputs.wait_seconds * 10.0
        + inputs.compatibility * 100.0
        + inputs.distance_affinity * 10.0
}

/// Expansion stage: how far a participant's own filters have been widened
/// by time spent waiting, in four stages. Stage 0 is exact
/// filters; by stage 3 almost everything except gender compatibility,
/// blocks, and permanent history is eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpansionStage(pub i16);

impl ExpansionStage {
    pub const EXACT: Self = Self(0);
    pub const WIDE: Self = Self(1);
    pub const WIDER: Self = Self(2);
    pub const GUARANTEED: Self = Self(3);

    /// Which stage a queue entry should be at given how long it's been
    /// waiting, per the two configured thresholds (`expand_stage_thresholds_ms`).
    /// Stage 2 -> 3 has no time threshold of its own: it is only reached via
    /// the tier-3 guaranteed-match fallback in the orchestrator, never by
    /// wait time alone.
    pub fn for_wait(wait_ms: i64, thresholds: (i64, i64)) -> Self {
        let (stage1_at, stage2_at) = thresholds;
        if wait_ms >= stage2_at {
            Self::WIDER
        } else if wait_ms >= stage1_at {
            Self::WIDE
        } else {
            Self::EXACT
        }
    }
}

/// Widened preferences for a given expansion stage. Stage 3 returns `None`
/// for every numeric bound, signaling to the Selector that only identity
/// filters (gender compatibility, block list, permanent history) still
/// apply.
#[derive(Debug, Clone)]
pub struct WidenedPreferences {
    pub age_min: i32,
    pub age_max: i32,
    pub max_distance: Option<f64>,
    /// Stage 2+: also accept candidates whose last heartbeat is stale
    /// (about to be swept into `soft_offline`) rather than excluding them
    /// outright.
    pub accept_stale_liveness: bool,
    /// Stage 3: identity filters only, every numeric bound is ignored.
    pub guaranteed: bool,
}

pub fn widen(prefs: &Preferences, stage: ExpansionStage) -> WidenedPreferences {
    match stage {
        ExpansionStage::EXACT => WidenedPreferences {
            age_min: prefs.age_min,
            age_max: prefs.age_max,
            max_distance: prefs.max_distance,
            accept_stale_liveness: false,
            guaranteed: false,
        },
        ExpansionStage::WIDE => WidenedPreferences {
            age_min: prefs.age_min - 2,
            age_max: prefs.age_max + 2,
            max_distance: prefs.max_distance.map(|d| d * 1.2),
            accept_stale_liveness: false,
            guaranteed: false,
        },
        ExpansionStage::WIDER => WidenedPreferences {
            age_min: prefs.age_min - 5,
            age_max: prefs.age_max + 5,
            max_distance: prefs.max_distance.map(|d| d * 1.5),
            accept_stale_liveness: true,
            guaranteed: false,
        },
        _ => WidenedPreferences {
            age_min: i32::MIN,
            age_max: i32::MAX,
            max_distance: None,
            accept_stale_liveness: true,
            guaranteed: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_wait_caps_at_500() {
        let score = fairness_score(FairnessInputs {
            wait_seconds: 100_000.0,
            skip_count: 0,
            narrowness: 1.0,
            queue_size: 10,
            accumulated_boosts: 0.0,
        });
        // narrowness 1.0 -> no penalty, queue_size 10 -> no density boost
        assert_eq!(score, BASE_WAIT_CAP);
    }

    #[test]
    fn skip_penalty_caps_at_300() {
        let score = fairness_score(FairnessInputs {
            wait_seconds: 0.0,
            skip_count: 100,
            narrowness: 1.0,
            queue_size: 10,
            accumulated_boosts: 0.0,
        });
        assert_eq!(score, SKIP_PENALTY_CAP);
    }

    #[test]
    fn narrow_preferences_add_up_to_100() {
        let score = fairness_score(FairnessInputs {
            wait_seconds: 0.0,
            skip_count: 0,
            narrowness: 0.0,
            queue_size: 10,
            accumulated_boosts: 0.0,
        });
        assert_eq!(score, NARROW_PREFERENCE_WEIGHT);
    }

    #[test]
    fn density_boost_never_goes_negative() {
        let score = fairness_score(FairnessInputs {
            wait_seconds: 0.0,
            skip_count: 0,
            narrowness: 1.0,
            queue_size: 500,
            accumulated_boosts: 0.0,
        });
        assert_eq!(score, 0.0);
    }

    #[test]
    fn stage_progression_follows_thresholds() {
        let thresholds = (30_000, 60_000);
        assert_eq!(ExpansionStage::for_wait(0, thresholds), ExpansionStage::EXACT);
        assert_eq!(ExpansionStage::for_wait(30_000, thresholds), ExpansionStage::WIDE);
        assert_eq!(ExpansionStage::for_wait(60_000, thresholds), ExpansionStage::WIDER);
    }

    #[test]
    fn guaranteed_stage_drops_numeric_bounds() {
        let prefs = Preferences {
            gender_preference: vec![],
            age_min: 25,
            age_max: 30,
            max_distance: Some(10.0),
        };
        let widened = widen(&prefs, ExpansionStage::GUARANTEED);
        assert!(widened.guaranteed);
        assert!(widened.max_distance.is_none());
    }
}
