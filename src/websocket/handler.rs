use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config;
use crate::models::ReceivedMessage;
use crate::services::auth_service;
use crate::state::AppState;
use crate::utils::scope_guard::ScopeGuard;
use crate::websocket::msg_comment_handler::handle_add_comment;
use crate::websocket::msg_edit_handler::handle_edit_message;
use crate::websocket::msg_join_handler::{
    announce_departure, handle_join_message, handle_leave_message,
};
use crate::websocket::msg_signal_handler::{
    handle_cursor_update, handle_selection_update, handle_typing_start, handle_typing_stop,
};
use crate::ws::connection::CollabSession;
use crate::ws::presence::ConnId;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    // The credential may arrive as a Bearer header, an auth_token cookie, or
    // a token query parameter; validation happens after the upgrade so the
    // client gets an error event rather than a bare refused upgrade.
    let token = auth_service::get_auth_token(&headers).or(query.token);
    ws.on_upgrade(move |socket| handle_socket(socket, token, app_state))
}

/// Handle one WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, token: Option<String>, app_state: Arc<AppState>) {
    // Opaque handle identifying this client link
    let conn_id = Uuid::new_v4();
    let (mut sink, mut receiver) = socket.split();

    // Everything sent to this connection funnels through one channel, so
    // broadcast fan-out and direct replies cannot interleave a frame.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let write_task = tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Handshake authentication. A refused handshake gets the error event and
    // a closed link; no presence state is ever created for it.
    let secret = config::get_config().auth_jwt_secret.as_deref();
    let user = match auth_service::authenticate_handshake(token, secret, &app_state.store).await {
        Ok(user) => user,
        Err(e) => {
            warn!("WebSocket handshake refused: {}", e);
            let _ = out_tx.send(e.to_event().to_wire());
            drop(out_tx);
            let _ = write_task.await;
            return;
        }
    };

    info!(
        "WebSocket connection established for user {} with connection_id {}",
        user.user_id, conn_id
    );
    app_state.registry.register(conn_id, user.clone(), out_tx.clone());
    let session = CollabSession::new(conn_id, user, app_state.clone(), out_tx);

    // Presence cleanup must run on every exit path, clean close or abrupt
    // socket error, so it lives in a drop guard.
    let cleanup_state = app_state.clone();
    let cleanup = ScopeGuard::new(move || disconnect_cleanup(&cleanup_state, conn_id));

    // Inbound loop: events from one sender are handled strictly in order.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(raw)) => dispatch_message(&raw, &session).await,
            Ok(Message::Close(_)) => break,
            // Ping/pong are handled by the transport; binary frames are not
            // part of the protocol.
            Ok(_) => continue,
            Err(e) => {
                info!("WebSocket error on connection {}: {}", conn_id, e);
                break;
            }
        }
    }

    // Tear down: remove presence state immediately, then let the writer
    // drain. In-flight persistence tasks already spawned run to completion.
    drop(session);
    drop(cleanup);
    let _ = write_task.await;
    info!("WebSocket connection {} terminated", conn_id);
}

async fn dispatch_message(raw: &str, session: &CollabSession) {
    let msg: ReceivedMessage = match serde_json::from_str(raw) {
        Ok(msg) => msg,
        Err(e) => {
            // Best-effort UX signals; malformed frames are dropped.
            debug!(
                "Dropping malformed frame from connection {}: {}",
                session.conn_id, e
            );
            return;
        }
    };

    match msg {
        ReceivedMessage::JoinReport(join) => handle_join_message(&join, session).await,
        ReceivedMessage::LeaveReport(leave) => handle_leave_message(&leave, session),
        ReceivedMessage::EditSection(edit) => handle_edit_message(&edit, session).await,
        ReceivedMessage::CursorUpdate(cursor) => handle_cursor_update(&cursor, session),
        ReceivedMessage::SelectionUpdate(selection) => handle_selection_update(&selection, session),
        ReceivedMessage::TypingStart(typing) => handle_typing_start(&typing, session),
        ReceivedMessage::TypingStop(typing) => handle_typing_stop(&typing, session),
        ReceivedMessage::AddComment(comment) => handle_add_comment(&comment, session).await,
    }
}

/// Implicit leave for whatever room the connection was joined to, plus cursor
/// cleanup. Runs for graceful closes and abrupt disconnects alike.
pub(crate) fn disconnect_cleanup(state: &Arc<AppState>, conn_id: ConnId) {
    if let Some(departure) = state.registry.unregister(conn_id) {
        info!(
            "Connection {} removed from report {}",
            conn_id, departure.report_id
        );
        announce_departure(state, &departure);
    }
}
