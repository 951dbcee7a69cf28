use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::messages::{ErrorMessage, SendMessage};

/// Response for an error
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

/// Failure classes for collaboration events.
///
/// The handshake variants (`AuthenticationRequired`, `InvalidToken`,
/// `UserNotFound`) refuse the connection before any room state exists. Every
/// other variant is reported to the requesting client only and leaves the
/// connection open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollabError {
    AuthenticationRequired,
    InvalidToken,
    UserNotFound,
    AccessDenied,
    NotInRoom,
    SectionNotFound,
    Persistence(String),
}

impl std::fmt::Display for CollabError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollabError::AuthenticationRequired => write!(f, "authentication required"),
            CollabError::InvalidToken => write!(f, "invalid token"),
            CollabError::UserNotFound => write!(f, "user not found"),
            CollabError::AccessDenied => write!(f, "access denied to report"),
            CollabError::NotInRoom => write!(f, "not in a report room"),
            CollabError::SectionNotFound => write!(f, "section not found"),
            CollabError::Persistence(detail) => write!(f, "failed to save changes: {}", detail),
        }
    }
}

impl std::error::Error for CollabError {}

impl CollabError {
    /// Wrap the error as an `error` event for the requesting client.
    pub fn to_event(&self) -> SendMessage {
        SendMessage::Error(ErrorMessage {
            message: self.to_string(),
        })
    }
}
