use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{
    history_cooldown, history_mutual_accept, journal_entries, match_records, participants,
    queue_entries,
};

// --- Participant ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = participants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Participant {
    pub id: Uuid,
    pub state: String,
    pub prev_state: Option<String>,
    pub current_match_id: Option<Uuid>,
    pub fatal_suppressed: bool,
    pub last_heartbeat_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = participants)]
pub struct NewParticipant {
    pub id: Uuid,
    pub state: String,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = participants)]
pub struct ParticipantStateUpdate {
    pub state: String,
    pub prev_state: Option<String>,
    pub current_match_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

// --- QueueEntry ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = queue_entries)]
#[diesel(primary_key(participant_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct QueueEntry {
    pub participant_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub fairness_score: f64,
    pub accumulated_boosts: f64,
    pub expansion_stage: i16,
    pub skip_count: i32,
    pub last_update_at: DateTime<Utc>,
    pub filters: serde_json::Value,
    pub profile_snapshot: serde_json::Value,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = queue_entries)]
pub struct NewQueueEntry {
    pub participant_id: Uuid,
    pub fairness_score: f64,
    pub filters: serde_json::Value,
    pub profile_snapshot: serde_json::Value,
}

// --- MatchRecord ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = match_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MatchRecord {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub status: String,
    pub tier: i16,
    pub created_at: DateTime<Utc>,
    pub vote_window_start: Option<DateTime<Utc>>,
    pub vote_window_expiry: Option<DateTime<Utc>>,
    pub vote_a: String,
    pub vote_b: String,
    pub ack_a: bool,
    pub ack_b: bool,
    pub outcome: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = match_records)]
pub struct NewMatchRecord {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub status: String,
    pub tier: i16,
}

#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = match_records)]
pub struct MatchRecordUpdate {
    pub status: Option<String>,
    pub vote_window_start: Option<DateTime<Utc>>,
    pub vote_window_expiry: Option<DateTime<Utc>>,
    pub vote_a: Option<String>,
    pub vote_b: Option<String>,
    pub ack_a: Option<bool>,
    pub ack_b: Option<bool>,
    pub outcome: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
}

// --- History ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = history_mutual_accept)]
#[diesel(primary_key(participant_a, participant_b))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HistoryMutualAccept {
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = history_mutual_accept)]
pub struct NewHistoryMutualAccept {
    pub participant_a: Uuid,
    pub participant_b: Uuid,
}

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = history_cooldown)]
#[diesel(primary_key(participant_a, participant_b))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HistoryCooldown {
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = history_cooldown)]
pub struct NewHistoryCooldown {
    pub participant_a: Uuid,
    pub participant_b: Uuid,
}

// --- Journal ---

#[derive(Debug, Queryable, Identifiable, Selectable, Serialize, Clone)]
#[diesel(table_name = journal_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct JournalEntry {
    pub id: Uuid,
    pub participant_id: Option<Uuid>,
    pub match_id: Option<Uuid>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = journal_entries)]
pub struct NewJournalEntry {
    pub id: Uuid,
    pub participant_id: Option<Uuid>,
    pub match_id: Option<Uuid>,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Canonical pair ordering used everywhere a pair of participant ids is stored
/// or looked up: smaller uuid first.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Yes,
    Pass,
    None,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Yes => "yes",
            Vote::Pass => "pass",
            Vote::None => "none",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "yes" => Vote::Yes,
            "pass" => Vote::Pass,
            _ => Vote::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    BothYes,
    YesPass,
    PassPass,
    YesIdle,
    PassIdle,
    IdleIdle,
    Cancelled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::BothYes => "both_yes",
            Outcome::YesPass => "yes_pass",
            Outcome::PassPass => "pass_pass",
            Outcome::YesIdle => "yes_idle",
            Outcome::PassIdle => "pass_idle",
            Outcome::IdleIdle => "idle_idle",
            Outcome::Cancelled => "cancelled",
        }
    }

    /// Outcome resolution table: resolves (vote_a, vote_b) once the
    /// window has closed. A missing vote at window expiry is treated as `idle`.
    pub fn resolve(a: Vote, b: Vote) -> Self {
        use Vote::*;
        match (a, b) {
            (Yes, Yes) => Outcome::BothYes,
            (Yes, Pass) | (Pass, Yes) => Outcome::YesPass,
            (Pass, Pass) => Outcome::PassPass,
            (Yes, None) | (None, Yes) => Outcome::YesIdle,
            (Pass, None) | (None, Pass) => Outcome::PassIdle,
            (None, None) => Outcome::IdleIdle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_orders_smaller_uuid_first() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        assert_eq!(canonical_pair(a, b), (a, b));
        assert_eq!(canonical_pair(b, a), (a, b));
    }

    #[test]
    fn outcome_resolution_table_matches_spec() {
        use Vote::*;
        assert_eq!(Outcome::resolve(Yes, Yes), Outcome::BothYes);
        assert_eq!(Outcome::resolve(Yes, Pass), Outcome::YesPass);
        assert_eq!(Outcome::resolve(Pass, Yes), Outcome::YesPass);
        assert_eq!(Outcome::resolve(Pass, Pass), Outcome::PassPass);
        assert_eq!(Outcome::resolve(Yes, None), Outcome::YesIdle);
        assert_eq!(Outcome::resolve(None, Yes), Outcome::YesIdle);
        assert_eq!(Outcome::resolve(Pass, None), Outcome::PassIdle);
        assert_eq!(Outcome::resolve(None, Pass), Outcome::PassIdle);
        assert_eq!(Outcome::resolve(None, None), Outcome::IdleIdle);
    }

    #[test]
    fn vote_str_round_trips() {
        assert_eq!(Vote::from_str(Vote::Yes.as_str()), Vote::Yes);
        assert_eq!(Vote::from_str(Vote::Pass.as_str()), Vote::Pass);
        assert_eq!(Vote::from_str(Vote::None.as_str()), Vote::None);
        assert_eq!(Vote::from_str("garbage"), Vote::None);
    }
}
