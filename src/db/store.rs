use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User row from the platform user table
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub org: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
}

/// Report section row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SectionRow {
    pub id: Uuid,
    pub report: Uuid,
    pub title: String,
    pub content: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// Persisted comment row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub report: Uuid,
    pub section: Uuid,
    pub author: String,
    pub content: String,
    pub parent: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Durable-store collaborator consumed by the collaboration server.
///
/// Everything the subsystem persists or authorizes goes through this seam;
/// the server itself keeps no durable state. The production implementation
/// is [`crate::db::dbreport::DbReport`] on Postgres.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Resolve a user id to an active account, or None.
    async fn load_active_user(&self, user_id: &str) -> Result<Option<UserRow>>;

    /// Batch-resolve user ids to display identities. Unknown ids are skipped.
    async fn load_users_by_ids(&self, user_ids: &[String]) -> Result<Vec<UserRow>>;

    /// Does this organization have access to the report?
    async fn org_has_report_access(&self, org: &str, report_id: Uuid) -> Result<bool>;

    /// Load a section, scoped to the report it must belong to.
    async fn load_section(&self, report_id: Uuid, section_id: Uuid) -> Result<Option<SectionRow>>;

    /// Overwrite the section's durable content (last write wins).
    async fn update_section_content(
        &self,
        section_id: Uuid,
        content: &serde_json::Value,
        user_id: &str,
    ) -> Result<()>;

    /// Append a version-history entry and return the assigned version number.
    /// Version numbers are monotonic per section and collision-free under
    /// concurrent edits.
    async fn append_section_version(
        &self,
        report_id: Uuid,
        section_id: Uuid,
        content: &serde_json::Value,
        user_id: &str,
    ) -> Result<i32>;

    /// Persist a new comment and return the stored row.
    async fn insert_comment(
        &self,
        report_id: Uuid,
        section_id: Uuid,
        author_id: &str,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> Result<CommentRow>;
}
