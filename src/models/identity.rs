use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity resolved during the websocket handshake.
/// Attached to the connection and immutable for its lifetime.
#[derive(Clone, Debug)]
pub struct AuthedUser {
    pub user_id: String,
    pub organization_id: String,
    pub display_name: String,
    pub role: String,
}

/// Wire view of a room member.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: String,
    pub display_name: String,
    pub role: String,
}

impl From<&AuthedUser> for Collaborator {
    fn from(user: &AuthedUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            display_name: user.display_name.clone(),
            role: user.role.clone(),
        }
    }
}

/// Wire view of a persisted comment, enriched with author display fields.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub report_id: Uuid,
    pub section_id: Uuid,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub created_at: String,
}
