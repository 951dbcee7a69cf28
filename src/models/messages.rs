use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Collaborator, CommentView};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JoinReportMessage {
    pub report_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LeaveReportMessage {
    pub report_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EditSectionMessage {
    pub section_id: Uuid,
    /// Section content is opaque to the relay; it is forwarded and persisted as-is.
    pub content: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdateMessage {
    pub section_id: Uuid,
    pub position: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SelectionUpdateMessage {
    pub section_id: Uuid,
    pub start: u32,
    pub end: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TypingMessage {
    pub section_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AddCommentMessage {
    pub section_id: Uuid,
    pub content: String,
    pub parent_id: Option<Uuid>,
}

/// Events received from clients
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "join-report")]
    JoinReport(JoinReportMessage),
    #[serde(rename = "leave-report")]
    LeaveReport(LeaveReportMessage),
    #[serde(rename = "edit-section")]
    EditSection(EditSectionMessage),
    #[serde(rename = "cursor-update")]
    CursorUpdate(CursorUpdateMessage),
    #[serde(rename = "selection-update")]
    SelectionUpdate(SelectionUpdateMessage),
    #[serde(rename = "typing-start")]
    TypingStart(TypingMessage),
    #[serde(rename = "typing-stop")]
    TypingStop(TypingMessage),
    #[serde(rename = "add-comment")]
    AddComment(AddCommentMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CurrentCollaboratorsMessage {
    pub collaborators: Vec<Collaborator>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorJoinedMessage {
    pub user_id: String,
    pub user: Collaborator,
    pub collaborators: Vec<Collaborator>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorLeftMessage {
    pub user_id: String,
    pub user_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SectionUpdatedMessage {
    pub section_id: Uuid,
    pub content: serde_json::Value,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovedMessage {
    pub user_id: String,
    pub user_name: String,
    pub section_id: Uuid,
    pub position: u32,
    pub color: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChangedMessage {
    pub user_id: String,
    pub user_name: String,
    pub section_id: Uuid,
    pub start: u32,
    pub end: u32,
    pub color: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingMessage {
    pub user_id: String,
    pub user_name: String,
    pub section_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserStoppedTypingMessage {
    pub user_id: String,
    pub section_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}

/// Events sent to clients
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "current-collaborators")]
    CurrentCollaborators(CurrentCollaboratorsMessage),
    #[serde(rename = "collaborator-joined")]
    CollaboratorJoined(CollaboratorJoinedMessage),
    #[serde(rename = "collaborator-left")]
    CollaboratorLeft(CollaboratorLeftMessage),
    #[serde(rename = "section-updated")]
    SectionUpdated(SectionUpdatedMessage),
    #[serde(rename = "cursor-moved")]
    CursorMoved(CursorMovedMessage),
    #[serde(rename = "selection-changed")]
    SelectionChanged(SelectionChangedMessage),
    #[serde(rename = "user-typing")]
    UserTyping(UserTypingMessage),
    #[serde(rename = "user-stopped-typing")]
    UserStoppedTyping(UserStoppedTypingMessage),
    #[serde(rename = "comment-added")]
    CommentAdded(CommentView),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

impl SendMessage {
    /// Serialize for the wire. Outbound messages only hold JSON-safe types,
    /// so serialization cannot fail in practice.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize outbound message: {}", e);
            r#"{"type":"error","message":"internal serialization error"}"#.to_string()
        })
    }
}
