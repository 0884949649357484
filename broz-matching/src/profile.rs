//! Profile/preference directory — a read-only adapter over the user
//! service. The matching core never writes profile data; it only reads
//! the attributes and preferences it needs to score and filter candidates.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{MatchingError, MatchingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub participant_id: Uuid,
    pub gender: Gender,
    pub age: i32,
    /// Coarse location, e.g. a country or region code — never exact
    /// coordinates, per the directory's read-only/coarse-location contract.
    pub coarse_location: String,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Preferences {
    pub gender_preference: Vec<Gender>,
    pub age_min: i32,
    pub age_max: i32,
    /// Maximum acceptable distance, in the directory's own distance units,
    /// between coarse locations. `None` means no distance preference.
    pub max_distance: Option<f64>,
}

impl Preferences {
    /// Tightness of this participant's preferences, in [0, 1], combining
    /// age-range width and distance tightness — used by the fairness
    /// engine's `narrow_preference_penalty`.
    pub fn narrowness(&self) -> f64 {
        let age_span = (self.age_max - self.age_min).max(1) as f64;
        // A 2-year window is maximally narrow; a 60-year window is wide open.
        let age_narrowness = (1.0 - (age_span - 2.0) / 58.0).clamp(0.0, 1.0);

        let distance_narrowness = match self.max_distance {
            Some(d) if d <= 0.0 => 1.0,
            Some(d) => (1.0 - d / 500.0).clamp(0.0, 1.0),
            None => 0.0,
        };

        (age_narrowness + distance_narrowness) / 2.0
    }
}

impl Gender {
    /// Bidirectional gender compatibility check: `a` is willing to be
    /// matched with `b` and vice versa.
    pub fn compatible(a: &Profile, b: &Profile) -> bool {
        a.preferences.gender_preference.contains(&b.gender)
            && b.preferences.gender_preference.contains(&a.gender)
    }
}

/// Trait seam over the Profile/Preference Directory so the matching
/// components never depend directly on `reqwest` or the user service's
/// wire format.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get_profile(&self, participant_id: Uuid) -> MatchingResult<Profile>;
}

/// HTTP-backed implementation calling the user service, following the same
/// `reqwest::Client` + bearer-token pattern the reference stack uses for
/// its other service-to-service calls (see `socket::handlers::on_send_like`).
pub struct HttpProfileDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileDirectory {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl ProfileDirectory for HttpProfileDirectory {
    async fn get_profile(&self, participant_id: Uuid) -> MatchingResult<Profile> {
        let url = format!("{}/internal/profiles/{}", self.base_url, participant_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MatchingError::Transient(format!("profile directory unreachable: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MatchingError::NotFound(format!(
                "no profile for participant {participant_id}"
            )));
        }

        if !response.status().is_success() {
            return Err(MatchingError::Transient(format!(
                "profile directory returned {}",
                response.status()
            )));
        }

        response
            .json::<Profile>()
            .await
            .map_err(|e| MatchingError::Transient(format!("malformed profile payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: u128, gender: Gender, wants: Vec<Gender>) -> Profile {
        Profile {
            participant_id: Uuid::from_u128(id),
            gender,
            age: 28,
            coarse_location: "US-CA".to_string(),
            preferences: Preferences {
                gender_preference: wants,
                age_min: 25,
                age_max: 30,
                max_distance: Some(50.0),
            },
        }
    }

    #[test]
    fn gender_compatible_requires_both_directions() {
        let a = profile(1, Gender::Male, vec![Gender::Female]);
        let b = profile(2, Gender::Female, vec![Gender::Male]);
        assert!(Gender::compatible(&a, &b));

        let one_sided = profile(3, Gender::Female, vec![Gender::NonBinary]);
        assert!(!Gender::compatible(&a, &one_sided));
    }

    #[test]
    fn narrowness_is_maximal_for_tight_preferences() {
        let prefs = Preferences {
            gender_preference: vec![],
            age_min: 28,
            age_max: 30,
            max_distance: Some(0.0),
        };
        assert_eq!(prefs.narrowness(), 1.0);
    }

    #[test]
    fn narrowness_is_low_for_wide_open_preferences() {
        let prefs = Preferences {
            gender_preference: vec![],
            age_min: 18,
            age_max: 80,
            max_distance: None,
        };
        assert!(prefs.narrowness() < 0.2);
    }
}
