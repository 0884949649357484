//! Bridges the engine's own published domain events back out to connected
//! clients over Socket.IO. Nothing here touches Postgres: every event this
//! consumes was produced by `publisher` on the same service, so this is
//! purely fan-out from RabbitMQ to whichever room the target participant's
//! socket currently sits in. A client that misses a push still sees the
//! same state through `GET /status`.

use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;
use socketioxide::SocketIo;

use broz_shared::clients::rabbitmq::RabbitMQClient;
use broz_shared::types::event::{payloads, routing_keys, Event};

const QUEUE_NAME: &str = "broz-matching.socket-bridge";

const ROUTING_KEYS: &[&str] = &[
    routing_keys::MATCHING_SESSION_STARTED,
    routing_keys::MATCHING_SESSION_ENDED,
    routing_keys::MATCHING_PARTICIPANT_STATE_CHANGED,
    routing_keys::MATCHING_MATCH_CREATED,
    routing_keys::MATCHING_VOTE_RECORDED,
    routing_keys::MATCHING_OUTCOME_RESOLVED,
    routing_keys::MATCHING_QUEUE_EXPANDED,
    routing_keys::MATCHING_OFFLINE_DETECTED,
    routing_keys::MATCHING_OFFLINE_FINALIZED,
];

/// Consumes every matching event this service itself publishes and re-emits
/// each one to the participants it concerns.
pub async fn bridge_to_sockets(rabbitmq: RabbitMQClient, io: SocketIo) -> anyhow::Result<()> {
    let mut consumer = rabbitmq.subscribe(QUEUE_NAME, ROUTING_KEYS).await?;

    tracing::info!(queue = QUEUE_NAME, "listening for matching events to push over sockets");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                dispatch(&io, &delivery.data);
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => tracing::error!(error = %e, "matching socket bridge consumer error"),
        }
    }

    Ok(())
}

fn dispatch(io: &SocketIo, raw: &[u8]) {
    let Ok(event_type) = peek_event_type(raw) else {
        tracing::warn!("failed to read event_type from matching event envelope");
        return;
    };

    macro_rules! emit_one {
        ($payload:ty, $key:expr, $participant:expr) => {
            match serde_json::from_slice::<Event<$payload>>(raw) {
                Ok(event) => {
                    let participant = $participant(&event.data);
                    crate::socket::handlers::emit_to_participant(io, participant, $key, &event.data);
                }
                Err(e) => tracing::error!(error = %e, event_type = %event_type, "failed to deserialize matching event"),
            }
        };
    }

    match event_type.as_str() {
        routing_keys::MATCHING_SESSION_STARTED => {
            match serde_json::from_slice::<Event<payloads::MatchSessionStarted>>(raw) {
                Ok(event) => {
                    crate::socket::handlers::emit_to_participant(io, event.data.user_a_id, "session_started", &event.data);
                    crate::socket::handlers::emit_to_participant(io, event.data.user_b_id, "session_started", &event.data);
                }
                Err(e) => tracing::error!(error = %e, "failed to deserialize session.started event"),
            }
        }
        routing_keys::MATCHING_SESSION_ENDED => {
            match serde_json::from_slice::<Event<payloads::MatchSessionEnded>>(raw) {
                Ok(event) => {
                    crate::socket::handlers::emit_to_participant(io, event.data.user_a_id, "session_ended", &event.data);
                    crate::socket::handlers::emit_to_participant(io, event.data.user_b_id, "session_ended", &event.data);
                }
                Err(e) => tracing::error!(error = %e, "failed to deserialize session.ended event"),
            }
        }
        routing_keys::MATCHING_PARTICIPANT_STATE_CHANGED => {
            emit_one!(payloads::ParticipantStateChanged, "participant_state_changed", |d: &payloads::ParticipantStateChanged| d.participant_id);
        }
        routing_keys::MATCHING_MATCH_CREATED => {
            match serde_json::from_slice::<Event<payloads::MatchCreated>>(raw) {
                Ok(event) => {
                    crate::socket::handlers::emit_to_participant(io, event.data.participant_a, "match_created", &event.data);
                    crate::socket::handlers::emit_to_participant(io, event.data.participant_b, "match_created", &event.data);
                }
                Err(e) => tracing::error!(error = %e, "failed to deserialize match.created event"),
            }
        }
        routing_keys::MATCHING_VOTE_RECORDED => {
            emit_one!(payloads::VoteRecorded, "vote_recorded", |d: &payloads::VoteRecorded| d.participant_id);
        }
        routing_keys::MATCHING_OUTCOME_RESOLVED => {
            match serde_json::from_slice::<Event<payloads::OutcomeResolved>>(raw) {
                Ok(event) => {
                    crate::socket::handlers::emit_to_participant(io, event.data.participant_a, "outcome_resolved", &event.data);
                    crate::socket::handlers::emit_to_participant(io, event.data.participant_b, "outcome_resolved", &event.data);
                }
                Err(e) => tracing::error!(error = %e, "failed to deserialize outcome.resolved event"),
            }
        }
        routing_keys::MATCHING_QUEUE_EXPANDED => {
            emit_one!(payloads::QueueExpanded, "queue_expanded", |d: &payloads::QueueExpanded| d.participant_id);
        }
        routing_keys::MATCHING_OFFLINE_DETECTED => {
            emit_one!(payloads::OfflineDetected, "offline_detected", |d: &payloads::OfflineDetected| d.participant_id);
        }
        routing_keys::MATCHING_OFFLINE_FINALIZED => {
            emit_one!(payloads::OfflineFinalized, "offline_finalized", |d: &payloads::OfflineFinalized| d.participant_id);
        }
        other => tracing::debug!(event_type = %other, "unhandled matching event type in socket bridge"),
    }
}

/// Events carry `event_type` as a plain string field; peeking it first lets
/// us route to the right concrete payload type without trying every one.
fn peek_event_type(raw: &[u8]) -> Result<String, serde_json::Error> {
    #[derive(serde::Deserialize)]
    struct Peek {
        event_type: String,
    }
    serde_json::from_slice::<Peek>(raw).map(|p| p.event_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peeks_event_type_without_full_payload() {
        let event = Event::new("broz-matching", routing_keys::MATCHING_QUEUE_EXPANDED, payloads::QueueExpanded {
            participant_id: uuid::Uuid::nil(),
            new_stage: 1,
        });
        let raw = serde_json::to_vec(&event).unwrap();
        assert_eq!(peek_event_type(&raw).unwrap(), routing_keys::MATCHING_QUEUE_EXPANDED);
    }
}
