//! Socket.IO layer — authenticates the connection and parks the socket in
//! its per-user room. All matchmaking state lives in Postgres and moves
//! through the REST surface in `routes::matching`; this module only
//! carries pushes from there out to connected clients as a near-real-time
//! push, with REST polling as the fallback when a push is missed.

use std::sync::Arc;

use serde::Serialize;
use socketioxide::extract::{SocketRef, State};
use socketioxide::SocketIo;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

pub async fn on_connect(socket: SocketRef, state: State<Arc<AppState>>) {
    let user_id = match authenticate_socket(&socket, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(error = %msg, "socket auth failed");
            let _ = socket.emit("error", &ErrorPayload { code: "AUTH_FAILED".into(), message: msg });
            socket.disconnect().ok();
            return;
        }
    };

    socket.extensions.insert(user_id);
    socket.on_disconnect(on_disconnect);

    let user_room = format!("user:{user_id}");
    socket.join(user_room).ok();

    tracing::info!(user_id = %user_id, sid = %socket.id, "socket connected");

    let presence_key = format!("presence:{user_id}");
    let _ = state.redis.set(&presence_key, &socket.id.to_string(), 3600).await;

    let _ = socket.emit("connected", &serde_json::json!({ "user_id": user_id }));
}

async fn on_disconnect(socket: SocketRef) {
    if let Some(user_id) = get_user_id(&socket) {
        tracing::info!(user_id = %user_id, sid = %socket.id, "socket disconnected");
    }
}

fn authenticate_socket(socket: &SocketRef, state: &Arc<AppState>) -> Result<Uuid, String> {
    let connect_info = socket.req_parts();

    let query = connect_info.uri.query().unwrap_or_default();
    let token = query
        .split('&')
        .find_map(|pair| {
            let mut split = pair.splitn(2, '=');
            let key = split.next()?;
            let value = split.next()?;
            if key == "token" { Some(value.to_string()) } else { None }
        })
        .ok_or_else(|| "missing token query parameter".to_string())?;

    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = jsonwebtoken::decode::<broz_shared::types::auth::Claims>(
        &token,
        &jsonwebtoken::DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| format!("invalid token: {e}"))?;

    if token_data.claims.is_expired() {
        return Err("token has expired".into());
    }

    Ok(token_data.claims.sub)
}

fn get_user_id(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

/// Pushes a named event into a single participant's private room. Used by
/// the RabbitMQ bridge in `events::subscriber` to re-emit the engine's own
/// published events to whichever socket the participant currently holds.
pub fn emit_to_participant<T: Serialize>(io: &SocketIo, participant_id: Uuid, event: &str, payload: &T) {
    let room = format!("user:{participant_id}");
    if let Err(e) = io.to(room).emit(event, payload) {
        tracing::warn!(participant_id = %participant_id, event, error = %e, "failed to emit to participant room");
    }
}
