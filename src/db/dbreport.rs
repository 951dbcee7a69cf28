use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::db::store::{CommentRow, ReportStore, SectionRow, UserRow};

/// Postgres-backed report store
pub struct DbReport {
    pool: PgPool,
}

impl DbReport {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn _pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReportStore for DbReport {
    async fn load_active_user(&self, user_id: &str) -> Result<Option<UserRow>> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, org, display_name, role, active
            FROM users
            WHERE id = $1 AND active = TRUE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn load_users_by_ids(&self, user_ids: &[String]) -> Result<Vec<UserRow>> {
        let users = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, org, display_name, role, active
            FROM users
            WHERE id = ANY($1::text[]) AND active = TRUE
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn org_has_report_access(&self, org: &str, report_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reports r
                WHERE r.id = $1 AND r.org = $2 AND r.deleted = FALSE
            ) AS has_access
            "#,
        )
        .bind(report_id)
        .bind(org)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<bool, _>("has_access"))
    }

    async fn load_section(&self, report_id: Uuid, section_id: Uuid) -> Result<Option<SectionRow>> {
        let section = sqlx::query_as::<_, SectionRow>(
            r#"
            SELECT id, report, title, content, updated_at, updated_by
            FROM report_sections
            WHERE id = $1 AND report = $2 AND deleted = FALSE
            "#,
        )
        .bind(section_id)
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(section)
    }

    async fn update_section_content(
        &self,
        section_id: Uuid,
        content: &serde_json::Value,
        user_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE report_sections
            SET content = $2, updated_at = NOW(), updated_by = $3
            WHERE id = $1
            "#,
        )
        .bind(section_id)
        .bind(content)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_section_version(
        &self,
        report_id: Uuid,
        section_id: Uuid,
        content: &serde_json::Value,
        user_id: &str,
    ) -> Result<i32> {
        let mut tx = self.pool.begin().await?;

        // The advisory lock serializes version assignment per section, so
        // MAX(version) + 1 cannot collide under concurrent edits.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(section_id.to_string())
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            r#"
            INSERT INTO section_versions (id, report, section, version, content, created_by, created_at)
            VALUES (
                $1, $2, $3,
                (SELECT COALESCE(MAX(version), 0) + 1 FROM section_versions WHERE section = $3),
                $4, $5, NOW()
            )
            RETURNING version
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(report_id)
        .bind(section_id)
        .bind(content)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row.get::<i32, _>("version"))
    }

    async fn insert_comment(
        &self,
        report_id: Uuid,
        section_id: Uuid,
        author_id: &str,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> Result<CommentRow> {
        let comment = sqlx::query_as::<_, CommentRow>(
            r#"
            INSERT INTO report_comments (id, report, section, author, content, parent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING id, report, section, author, content, parent, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(report_id)
        .bind(section_id)
        .bind(author_id)
        .bind(content)
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(comment)
    }
}
