//! Direct coverage of the store modules' DB-backed logic that the
//! spin -> pair -> vote scenarios in `spin_pair_vote.rs` only exercise
//! incidentally: idempotent inserts, cooldown bookkeeping, and the
//! Guardians' belt-and-braces duplicate check.

mod common;

use uuid::Uuid;

use broz_matching::models::Vote;
use broz_matching::stores::{history_store, match_store, queue_store};

use common::test_pool;

#[tokio::test]
async fn create_if_absent_is_idempotent_for_either_argument_order() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let first = match_store::create_if_absent(&mut conn, a, b, 1).unwrap();
    let second = match_store::create_if_absent(&mut conn, b, a, 1).unwrap();
    assert_eq!(first, second);

    let found = match_store::find_active_for_pair(&mut conn, a, b).unwrap().unwrap();
    assert_eq!(found.id, first);
}

#[tokio::test]
async fn vote_and_ack_are_tracked_per_side_regardless_of_argument_order() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let match_id = match_store::create_if_absent(&mut conn, a, b, 1).unwrap();
    let record = match_store::find(&mut conn, match_id).unwrap();
    let (lo, hi) = (record.participant_a, record.participant_b);

    match_store::record_ack(&mut conn, match_id, lo).unwrap();
    let record = match_store::record_ack(&mut conn, match_id, hi).unwrap();
    assert!(record.ack_a && record.ack_b);

    match_store::record_vote(&mut conn, match_id, lo, Vote::Yes).unwrap();
    let record = match_store::record_vote(&mut conn, match_id, hi, Vote::Pass).unwrap();
    assert_eq!(record.vote_a, "yes");
    assert_eq!(record.vote_b, "pass");
}

#[tokio::test]
async fn record_vote_rejects_a_participant_not_in_the_match() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    let match_id = match_store::create_if_absent(&mut conn, a, b, 1).unwrap();

    let result = match_store::record_vote(&mut conn, match_id, outsider, Vote::Yes);
    assert!(result.is_err());
}

#[tokio::test]
async fn expired_vote_windows_only_lists_vote_active_records_past_expiry() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let match_id = match_store::create_if_absent(&mut conn, a, b, 1).unwrap();

    // Still `paired`, no vote window yet: must not show up as expired.
    assert!(match_store::expired_vote_windows(&mut conn)
        .unwrap()
        .iter()
        .all(|r| r.id != match_id));

    match_store::start_vote_window(&mut conn, match_id, -1).unwrap(); // already expired
    let expired = match_store::expired_vote_windows(&mut conn).unwrap();
    assert!(expired.iter().any(|r| r.id == match_id));
}

#[tokio::test]
async fn cooldown_records_and_expires_by_window() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    assert!(!history_store::within_cooldown(&mut conn, a, b, 300_000).unwrap());

    history_store::record_pairing(&mut conn, a, b).unwrap();
    assert!(history_store::within_cooldown(&mut conn, a, b, 300_000).unwrap());
    assert!(history_store::within_cooldown(&mut conn, b, a, 300_000).unwrap(), "order must not matter");

    // A window of 0ms means "cooled down as of right now", which the
    // just-inserted row (created_at == now, not strictly after the cutoff)
    // has already aged out of.
    assert!(!history_store::within_cooldown(&mut conn, a, b, 0).unwrap());
}

#[tokio::test]
async fn mutual_accept_is_permanent_and_order_independent() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    assert!(!history_store::was_mutual_accept(&mut conn, a, b).unwrap());
    history_store::record_mutual_accept(&mut conn, a, b).unwrap();
    assert!(history_store::was_mutual_accept(&mut conn, a, b).unwrap());
    assert!(history_store::was_mutual_accept(&mut conn, b, a).unwrap());

    // Re-recording (e.g. a guardian retry) must not error.
    history_store::record_mutual_accept(&mut conn, b, a).unwrap();
}

#[tokio::test]
async fn prune_cooldown_older_than_only_deletes_aged_rows() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    history_store::record_pairing(&mut conn, a, b).unwrap();

    // Retention window far in the future relative to "now" prunes nothing.
    let pruned = history_store::prune_cooldown_older_than(&mut conn, 30 * 24 * 60 * 60 * 1000).unwrap();
    assert_eq!(pruned, 0);
    assert!(history_store::within_cooldown(&mut conn, a, b, 300_000).unwrap());

    // A retention window of 0ms means "anything not created in the future
    // is stale", so the row inserted just above is prunable immediately.
    let pruned = history_store::prune_cooldown_older_than(&mut conn, 0).unwrap();
    assert_eq!(pruned, 1);
}

#[tokio::test]
async fn queue_join_is_idempotent_and_remove_is_fail_soft() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let id = Uuid::new_v4();
    let first = queue_store::join(&mut conn, id, serde_json::json!({}), serde_json::json!({})).unwrap();
    let second = queue_store::join(&mut conn, id, serde_json::json!({"changed": true}), serde_json::json!({})).unwrap();
    assert_eq!(first.participant_id, second.participant_id);
    assert_eq!(second.filters, serde_json::json!({}), "join is a no-op on an existing entry");

    queue_store::remove(&mut conn, id).unwrap();
    assert!(queue_store::find(&mut conn, id).unwrap().is_none());
    // Removing again must not error.
    queue_store::remove(&mut conn, id).unwrap();
}

#[tokio::test]
async fn duplicate_participant_count_is_zero_absent_a_schema_violation() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let id = Uuid::new_v4();
    queue_store::join(&mut conn, id, serde_json::json!({}), serde_json::json!({})).unwrap();

    assert_eq!(queue_store::duplicate_participant_count(&mut conn).unwrap(), 0);
}

#[tokio::test]
async fn scan_all_matchable_never_drops_rows_the_capped_scan_might() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    let self_id = Uuid::new_v4();
    let mut others = Vec::new();
    for _ in 0..5 {
        let id = Uuid::new_v4();
        queue_store::join(&mut conn, id, serde_json::json!({}), serde_json::json!({})).unwrap();
        others.push(id);
    }

    let capped = queue_store::scan_priority_order(&mut conn, self_id, 2).unwrap();
    assert_eq!(capped.len(), 2, "the capped scan truncates at its limit");

    let all = queue_store::scan_all_matchable(&mut conn, self_id).unwrap();
    assert_eq!(all.len(), others.len(), "the uncapped scan must see every matchable row");
}
