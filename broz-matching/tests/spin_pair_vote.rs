//! Exercises the full spin -> pair -> vote pipeline against a real (rolled
//! back) Postgres connection and a real RabbitMQ channel, with the Profile
//! Directory swapped for an in-memory fake.

mod common;

use uuid::Uuid;

use broz_matching::models::{Outcome, Vote};
use broz_matching::orchestrator;
use broz_matching::pair_creator;
use broz_matching::profile::Gender;
use broz_matching::selector::{self, Tier};
use broz_matching::state_machine::{self, ParticipantState};
use broz_matching::stores::{history_store, match_store, queue_store};
use broz_matching::voting;

use common::{fixture_profile, test_config, test_pool, test_rabbitmq, FakeDirectory};

fn queue_two_compatible_participants(
    conn: &mut diesel::pg::PgConnection,
    directory: &FakeDirectory,
) -> (Uuid, Uuid) {
    let a_id = Uuid::new_v4();
    let b_id = Uuid::new_v4();

    directory.insert(fixture_profile(a_id, Gender::Male, vec![Gender::Female], 28, "US-CA"));
    directory.insert(fixture_profile(b_id, Gender::Female, vec![Gender::Male], 27, "US-CA"));

    for id in [a_id, b_id] {
        state_machine::ensure_participant(conn, id).unwrap();
        state_machine::transition(conn, id, ParticipantState::SpinActive, None, "test_spin").unwrap();
        queue_store::join(conn, id, serde_json::json!({}), serde_json::json!({})).unwrap();
    }

    (a_id, b_id)
}

#[tokio::test]
async fn both_yes_takes_a_pair_all_the_way_to_video_date() {
    let pool = test_pool();
    let directory = FakeDirectory::new();
    let config = test_config();
    let rabbitmq = test_rabbitmq().await;

    let (a_id, b_id) = {
        let mut conn = pool.get().unwrap();
        queue_two_compatible_participants(&mut conn, &directory)
    };

    let outcome = orchestrator::attempt_match_for_participant(&pool, &directory, &config, &rabbitmq, a_id)
        .await
        .unwrap()
        .expect("two compatible queued participants should pair");

    assert_eq!(outcome.participant_a.min(outcome.participant_b), a_id.min(b_id));

    let mut conn = pool.get().unwrap();
    let match_id = outcome.match_id;

    match_store::record_ack(&mut conn, match_id, a_id).unwrap();
    match_store::record_ack(&mut conn, match_id, b_id).unwrap();
    match_store::start_vote_window(&mut conn, match_id, config.vote_window_ms as i64).unwrap();
    state_machine::transition(&mut conn, a_id, ParticipantState::VoteActive, None, "test_ack").unwrap();
    state_machine::transition(&mut conn, b_id, ParticipantState::VoteActive, None, "test_ack").unwrap();

    voting::record_vote(&mut conn, match_id, a_id, Vote::Yes).unwrap();
    let resolved = voting::record_vote(&mut conn, match_id, b_id, Vote::Yes)
        .unwrap()
        .expect("both sides voted, should resolve immediately");

    assert_eq!(resolved.outcome, Outcome::BothYes);

    let a_state = state_machine::ensure_participant(&mut conn, a_id).unwrap().state;
    let b_state = state_machine::ensure_participant(&mut conn, b_id).unwrap().state;
    assert_eq!(a_state, ParticipantState::VideoDate.as_str());
    assert_eq!(b_state, ParticipantState::VideoDate.as_str());

    assert!(history_store::was_mutual_accept(&mut conn, a_id, b_id).unwrap());
    assert!(queue_store::find(&mut conn, a_id).unwrap().is_none());
    assert!(queue_store::find(&mut conn, b_id).unwrap().is_none());
}

#[tokio::test]
async fn pass_pass_frees_both_sides_and_starts_a_cooldown_tier_three_ignores() {
    let pool = test_pool();
    let directory = FakeDirectory::new();
    let config = test_config();
    let rabbitmq = test_rabbitmq().await;

    let (a_id, b_id) = {
        let mut conn = pool.get().unwrap();
        queue_two_compatible_participants(&mut conn, &directory)
    };

    let outcome = pair_creator::create_pair(
        &mut pool.get().unwrap(),
        &directory,
        &config,
        &rabbitmq,
        a_id,
        b_id,
        Tier::One,
    )
    .await
    .unwrap()
    .expect("directly pairing two fresh, compatible queued participants should succeed");

    let mut conn = pool.get().unwrap();
    state_machine::transition(&mut conn, a_id, ParticipantState::VoteActive, None, "test_ack").unwrap();
    state_machine::transition(&mut conn, b_id, ParticipantState::VoteActive, None, "test_ack").unwrap();
    match_store::start_vote_window(&mut conn, outcome.match_id, config.vote_window_ms as i64).unwrap();

    voting::record_vote(&mut conn, outcome.match_id, a_id, Vote::Pass).unwrap();
    let resolved = voting::record_vote(&mut conn, outcome.match_id, b_id, Vote::Pass)
        .unwrap()
        .unwrap();
    assert_eq!(resolved.outcome, Outcome::PassPass);

    assert!(history_store::within_cooldown(&mut conn, a_id, b_id, config.cooldown_ms as i64).unwrap());

    // Rejoin the queue post-rejection, same as a real `spin` call would.
    queue_store::join(&mut conn, a_id, serde_json::json!({}), serde_json::json!({})).unwrap();
    queue_store::join(&mut conn, b_id, serde_json::json!({}), serde_json::json!({})).unwrap();

    let self_profile = directory.get_profile(a_id).await.unwrap();
    use broz_matching::fairness::ExpansionStage;

    let tier_one_pick = selector::select(
        &mut conn,
        &directory,
        &config,
        a_id,
        &self_profile,
        ExpansionStage::EXACT,
        Tier::One,
        config.cooldown_ms as i64,
        &[],
    )
    .await
    .unwrap();
    assert_eq!(tier_one_pick, None, "tier one must respect the fresh cooldown");

    let tier_three_pick = selector::select(
        &mut conn,
        &directory,
        &config,
        a_id,
        &self_profile,
        ExpansionStage::EXACT,
        Tier::Three,
        config.cooldown_ms as i64,
        &[],
    )
    .await
    .unwrap();
    assert_eq!(tier_three_pick, Some(b_id), "tier three's guarantee must bypass cooldown");
}

#[tokio::test]
async fn disconnect_at_formation_frees_the_partner_back_to_spin_active() {
    let pool = test_pool();
    let directory = FakeDirectory::new();
    let config = test_config();
    let rabbitmq = test_rabbitmq().await;

    let (a_id, b_id) = {
        let mut conn = pool.get().unwrap();
        queue_two_compatible_participants(&mut conn, &directory)
    };

    let outcome = pair_creator::create_pair(&mut pool.get().unwrap(), &directory, &config, &rabbitmq, a_id, b_id, Tier::One)
        .await
        .unwrap()
        .expect("pairing should succeed");

    let mut conn = pool.get().unwrap();
    let result = voting::cancel(&mut conn, outcome.match_id, b_id, ParticipantState::Idle).unwrap();
    assert_eq!(result.outcome, Outcome::Cancelled);

    let a_state = state_machine::ensure_participant(&mut conn, a_id).unwrap().state;
    let b_state = state_machine::ensure_participant(&mut conn, b_id).unwrap().state;
    assert_eq!(a_state, ParticipantState::SpinActive.as_str());
    assert_eq!(b_state, ParticipantState::Idle.as_str());

    let record = match_store::find(&mut conn, outcome.match_id).unwrap();
    assert_eq!(record.status, match_store::STATUS_ENDED);
    assert_eq!(record.outcome.as_deref(), Some(Outcome::Cancelled.as_str()));
}

#[tokio::test]
async fn create_pair_rejects_gender_incompatible_candidates() {
    let pool = test_pool();
    let directory = FakeDirectory::new();
    let config = test_config();
    let rabbitmq = test_rabbitmq().await;

    let a_id = Uuid::new_v4();
    let b_id = Uuid::new_v4();
    directory.insert(fixture_profile(a_id, Gender::Male, vec![Gender::Female], 28, "US-CA"));
    // b only wants non-binary partners, so the pair is one-sided incompatible.
    directory.insert(fixture_profile(b_id, Gender::Female, vec![Gender::NonBinary], 27, "US-CA"));

    let mut conn = pool.get().unwrap();
    for id in [a_id, b_id] {
        state_machine::ensure_participant(&mut conn, id).unwrap();
        state_machine::transition(&mut conn, id, ParticipantState::SpinActive, None, "test_spin").unwrap();
        queue_store::join(&mut conn, id, serde_json::json!({}), serde_json::json!({})).unwrap();
    }

    let outcome = pair_creator::create_pair(&mut conn, &directory, &config, &rabbitmq, a_id, b_id, Tier::One)
        .await
        .unwrap();
    assert!(outcome.is_none());

    // Both participants remain matchable — a rejected candidate is not a
    // fatal error, just "no pair this attempt".
    assert!(queue_store::find(&mut conn, a_id).unwrap().is_some());
    assert!(queue_store::find(&mut conn, b_id).unwrap().is_some());
}
