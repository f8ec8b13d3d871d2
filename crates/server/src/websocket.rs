//! WebSocket ingress (§4.11, §6): admission control at upgrade time, then a
//! handoff to the session handler for the lifetime of the connection.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::session;
use crate::state::AppState;

/// Upgrades the connection if a permit is available, otherwise refuses it
/// outright (503-equivalent) without ever constructing a session (§4.11,
/// §8 scenario 3).
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let permit = match state.admission.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            metrics::counter!("voice_agent_admission_rejections_total").increment(1);
            return (StatusCode::SERVICE_UNAVAILABLE, "at capacity").into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        let _permit = permit;
        session::handle_connection(socket, state).await;
    })
}
