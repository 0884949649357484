//! Append-only journal of state transitions and notifications.
//! Written once per transition by the State Machine; read by nothing in
//! the hot path — it exists purely as an audit trail the Guardians and
//! operators can use to reconstruct what happened to a participant/match.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::errors::MatchingResult;
use crate::models::NewJournalEntry;
use crate::schema::journal_entries;

pub fn append(
    conn: &mut PgConnection,
    participant_id: Option<Uuid>,
    match_id: Option<Uuid>,
    event_type: &str,
    payload: serde_json::Value,
) -> MatchingResult<()> {
    let entry = NewJournalEntry {
        id: Uuid::now_v7(),
        participant_id,
        match_id,
        event_type: event_type.to_string(),
        payload,
    };

    diesel::insert_into(journal_entries::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}
