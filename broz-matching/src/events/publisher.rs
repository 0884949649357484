use uuid::Uuid;

use broz_shared::clients::rabbitmq::RabbitMQClient;
use broz_shared::types::event::{payloads, routing_keys, Event};

pub async fn publish_session_started(
    rabbitmq: &RabbitMQClient,
    match_id: Uuid,
    user_a_id: Uuid,
    user_b_id: Uuid,
) {
    let event = Event::new(
        "broz-matching",
        routing_keys::MATCHING_SESSION_STARTED,
        payloads::MatchSessionStarted {
            match_id,
            user_a_id,
            user_b_id,
        },
    )
    .with_user(user_a_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MATCHING_SESSION_STARTED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish session.started event");
    }
}

pub async fn publish_session_ended(
    rabbitmq: &RabbitMQClient,
    match_id: Uuid,
    user_a_id: Uuid,
    user_b_id: Uuid,
    duration_secs: i32,
    end_reason: &str,
) {
    let event = Event::new(
        "broz-matching",
        routing_keys::MATCHING_SESSION_ENDED,
        payloads::MatchSessionEnded {
            match_id,
            user_a_id,
            user_b_id,
            duration_secs,
            end_reason: end_reason.to_string(),
        },
    )
    .with_user(user_a_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MATCHING_SESSION_ENDED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish session.ended event");
    }
}

pub async fn publish_participant_state_changed(
    rabbitmq: &RabbitMQClient,
    participant_id: Uuid,
    from_state: &str,
    to_state: &str,
    match_id: Option<Uuid>,
) {
    let event = Event::new(
        "broz-matching",
        routing_keys::MATCHING_PARTICIPANT_STATE_CHANGED,
        payloads::ParticipantStateChanged {
            participant_id,
            from_state: from_state.to_string(),
            to_state: to_state.to_string(),
            match_id,
        },
    )
    .with_user(participant_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MATCHING_PARTICIPANT_STATE_CHANGED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish participant.state_changed event");
    }
}

pub async fn publish_match_created(
    rabbitmq: &RabbitMQClient,
    match_id: Uuid,
    participant_a: Uuid,
    participant_b: Uuid,
    tier: i16,
) {
    let event = Event::new(
        "broz-matching",
        routing_keys::MATCHING_MATCH_CREATED,
        payloads::MatchCreated {
            match_id,
            participant_a,
            participant_b,
            tier,
        },
    )
    .with_user(participant_a);

    if let Err(e) = rabbitmq.publish(routing_keys::MATCHING_MATCH_CREATED, &event).await {
        tracing::error!(error = %e, "failed to publish match.created event");
    }
}

pub async fn publish_vote_recorded(rabbitmq: &RabbitMQClient, match_id: Uuid, participant_id: Uuid, vote: &str) {
    let event = Event::new(
        "broz-matching",
        routing_keys::MATCHING_VOTE_RECORDED,
        payloads::VoteRecorded {
            match_id,
            participant_id,
            vote: vote.to_string(),
        },
    )
    .with_user(participant_id);

    if let Err(e) = rabbitmq.publish(routing_keys::MATCHING_VOTE_RECORDED, &event).await {
        tracing::error!(error = %e, "failed to publish vote.recorded event");
    }
}

pub async fn publish_outcome_resolved(
    rabbitmq: &RabbitMQClient,
    match_id: Uuid,
    participant_a: Uuid,
    participant_b: Uuid,
    outcome: &str,
) {
    let event = Event::new(
        "broz-matching",
        routing_keys::MATCHING_OUTCOME_RESOLVED,
        payloads::OutcomeResolved {
            match_id,
            participant_a,
            participant_b,
            outcome: outcome.to_string(),
        },
    )
    .with_user(participant_a);

    if let Err(e) = rabbitmq.publish(routing_keys::MATCHING_OUTCOME_RESOLVED, &event).await {
        tracing::error!(error = %e, "failed to publish outcome.resolved event");
    }
}

pub async fn publish_queue_expanded(rabbitmq: &RabbitMQClient, participant_id: Uuid, new_stage: i16) {
    let event = Event::new(
        "broz-matching",
        routing_keys::MATCHING_QUEUE_EXPANDED,
        payloads::QueueExpanded { participant_id, new_stage },
    )
    .with_user(participant_id);

    if let Err(e) = rabbitmq.publish(routing_keys::MATCHING_QUEUE_EXPANDED, &event).await {
        tracing::error!(error = %e, "failed to publish queue.expanded event");
    }
}

pub async fn publish_offline_detected(rabbitmq: &RabbitMQClient, participant_id: Uuid, match_id: Option<Uuid>) {
    let event = Event::new(
        "broz-matching",
        routing_keys::MATCHING_OFFLINE_DETECTED,
        payloads::OfflineDetected { participant_id, match_id },
    )
    .with_user(participant_id);

    if let Err(e) = rabbitmq.publish(routing_keys::MATCHING_OFFLINE_DETECTED, &event).await {
        tracing::error!(error = %e, "failed to publish offline.detected event");
    }
}

pub async fn publish_offline_finalized(rabbitmq: &RabbitMQClient, participant_id: Uuid) {
    let event = Event::new(
        "broz-matching",
        routing_keys::MATCHING_OFFLINE_FINALIZED,
        payloads::OfflineFinalized { participant_id },
    )
    .with_user(participant_id);

    if let Err(e) = rabbitmq.publish(routing_keys::MATCHING_OFFLINE_FINALIZED, &event).await {
        tracing::error!(error = %e, "failed to publish offline.finalized event");
    }
}
