use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::{AuthedUser, CollabError, SendMessage};
use crate::state::AppState;
use crate::ws::presence::ConnId;

/// Per-connection context handed to every message handler.
///
/// Holds the identity attached at handshake time (immutable for the
/// connection's lifetime) and the outbound channel for direct replies.
pub struct CollabSession {
    pub conn_id: ConnId,
    pub user: AuthedUser,
    pub state: Arc<AppState>,
    out: UnboundedSender<String>,
}

impl CollabSession {
    pub fn new(
        conn_id: ConnId,
        user: AuthedUser,
        state: Arc<AppState>,
        out: UnboundedSender<String>,
    ) -> Self {
        Self {
            conn_id,
            user,
            state,
            out,
        }
    }

    /// Send an event to this connection only.
    pub fn send(&self, message: &SendMessage) {
        let _ = self.out.send(message.to_wire());
    }

    /// Report a failure to the requesting client only. Errors are never
    /// broadcast to other room members.
    pub fn send_error(&self, error: &CollabError) {
        self.send(&error.to_event());
    }

    /// Clone of the outbound channel, for tasks that outlive the handler call.
    pub fn outbound(&self) -> UnboundedSender<String> {
        self.out.clone()
    }
}
