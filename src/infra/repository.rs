use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::assignment::Assignment;
use crate::domain::moderator::Moderator;
use crate::domain::report::Report;
use crate::infra::db::Db;

/// Record-store failures. Unique-constraint rejections are kept apart from
/// everything else: the workflow engine interprets them (lost assignment
/// race, concurrent moderator creation) while all other failures are
/// infrastructure trouble.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    UniqueViolation(&'static str),
    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

/// Caller-supplied fields for a new report row.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub reporter_name: String,
    pub reporter_email: String,
    pub reported_institution: Option<String>,
    pub report_description: Option<String>,
    pub institution_name: Option<String>,
    pub institution_id: Option<String>,
    pub report_reason: Option<String>,
    pub content: Value,
}

/// Persistence access patterns for reports, assignments, and moderator
/// rows. Thin and rule-free: reads return absence as `None`/empty,
/// `update_content` merges without any version token, and
/// `create_assignment` lets the store's uniqueness constraint speak through
/// `StoreError::UniqueViolation` instead of deciding anything itself.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(&self, new: NewReport) -> Result<Report, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>, StoreError>;

    /// Batch fetch; an empty input yields an empty result with no
    /// round-trip.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Report>, StoreError>;

    /// All reports, newest first.
    async fn find_all(&self) -> Result<Vec<Report>, StoreError>;

    /// Shallow-merges `patch` into the stored content document and bumps
    /// `updated_at`. Returns the merged row, or `None` when the report no
    /// longer exists. Last write wins.
    async fn update_content(&self, id: Uuid, patch: Value)
        -> Result<Option<Report>, StoreError>;

    /// The assignment row for a report, optionally restricted to one
    /// moderator.
    async fn find_assignment(
        &self,
        report_id: Uuid,
        moderator_id: Option<&str>,
    ) -> Result<Option<Assignment>, StoreError>;

    async fn find_assignments_by_moderator(
        &self,
        moderator_id: &str,
    ) -> Result<Vec<Assignment>, StoreError>;

    async fn find_all_assigned_report_ids(&self) -> Result<Vec<Uuid>, StoreError>;

    async fn create_assignment(
        &self,
        report_id: Uuid,
        moderator_id: &str,
    ) -> Result<Assignment, StoreError>;

    /// Deletes the assignment row when it is owned by `moderator_id`;
    /// reports whether a row was removed.
    async fn delete_assignment(
        &self,
        report_id: Uuid,
        moderator_id: &str,
    ) -> Result<bool, StoreError>;

    async fn find_moderator(&self, user_id: &str) -> Result<Option<Moderator>, StoreError>;

    /// Inserts a minimal moderator row (id only). Surfaces a duplicate key
    /// as `UniqueViolation` for the directory to interpret.
    async fn insert_moderator(&self, user_id: &str) -> Result<Moderator, StoreError>;
}

#[derive(Clone)]
pub struct PgReportRepository {
    db: Db,
}

impl PgReportRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn report_from_row(row: &PgRow) -> Report {
    Report {
        id: row.get("id"),
        reporter_name: row.get("reporter_name"),
        reporter_email: row.get("reporter_email"),
        reported_institution: row.get("reported_institution"),
        report_description: row.get("report_description"),
        institution_name: row.get("institution_name"),
        institution_id: row.get("institution_id"),
        report_reason: row.get("report_reason"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn assignment_from_row(row: &PgRow) -> Assignment {
    Assignment {
        report_id: row.get("report_id"),
        moderator_id: row.get("moderator_id"),
        assigned_at: row.get("assigned_at"),
    }
}

fn moderator_from_row(row: &PgRow) -> Moderator {
    Moderator {
        user_id: row.get("user_id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        image_url: row.get("image_url"),
        created_at: row.get("created_at"),
    }
}

fn map_sqlx(relation: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::UniqueViolation(relation);
        }
    }
    StoreError::Unavailable(err.into())
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn create(&self, new: NewReport) -> Result<Report, StoreError> {
        let row = sqlx::query(
            "INSERT INTO reports (reporter_name, reporter_email, reported_institution, \
             report_description, institution_name, institution_id, report_reason, content) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, reporter_name, reporter_email, reported_institution, \
             report_description, institution_name, institution_id, report_reason, \
             content, created_at, updated_at",
        )
        .bind(&new.reporter_name)
        .bind(&new.reporter_email)
        .bind(&new.reported_institution)
        .bind(&new.report_description)
        .bind(&new.institution_name)
        .bind(&new.institution_id)
        .bind(&new.report_reason)
        .bind(&new.content)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| map_sqlx("reports", err))?;

        Ok(report_from_row(&row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        let row = sqlx::query(
            "SELECT id, reporter_name, reporter_email, reported_institution, \
             report_description, institution_name, institution_id, report_reason, \
             content, created_at, updated_at \
             FROM reports WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|err| map_sqlx("reports", err))?;

        Ok(row.as_ref().map(report_from_row))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Report>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, reporter_name, reporter_email, reported_institution, \
             report_description, institution_name, institution_id, report_reason, \
             content, created_at, updated_at \
             FROM reports WHERE id = ANY($1) ORDER BY created_at DESC",
        )
        .bind(ids.to_vec())
        .fetch_all(self.db.pool())
        .await
        .map_err(|err| map_sqlx("reports", err))?;

        Ok(rows.iter().map(report_from_row).collect())
    }

    async fn find_all(&self) -> Result<Vec<Report>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, reporter_name, reporter_email, reported_institution, \
             report_description, institution_name, institution_id, report_reason, \
             content, created_at, updated_at \
             FROM reports ORDER BY created_at DESC",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|err| map_sqlx("reports", err))?;

        Ok(rows.iter().map(report_from_row).collect())
    }

    async fn update_content(
        &self,
        id: Uuid,
        patch: Value,
    ) -> Result<Option<Report>, StoreError> {
        let row = sqlx::query(
            "UPDATE reports SET content = content || $2, updated_at = now() \
             WHERE id = $1 \
             RETURNING id, reporter_name, reporter_email, reported_institution, \
             report_description, institution_name, institution_id, report_reason, \
             content, created_at, updated_at",
        )
        .bind(id)
        .bind(&patch)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|err| map_sqlx("reports", err))?;

        Ok(row.as_ref().map(report_from_row))
    }

    async fn find_assignment(
        &self,
        report_id: Uuid,
        moderator_id: Option<&str>,
    ) -> Result<Option<Assignment>, StoreError> {
        let row = match moderator_id {
            Some(moderator_id) => {
                sqlx::query(
                    "SELECT report_id, moderator_id, assigned_at \
                     FROM report_assignments \
                     WHERE report_id = $1 AND moderator_id = $2",
                )
                .bind(report_id)
                .bind(moderator_id)
                .fetch_optional(self.db.pool())
                .await
            }
            None => {
                sqlx::query(
                    "SELECT report_id, moderator_id, assigned_at \
                     FROM report_assignments WHERE report_id = $1",
                )
                .bind(report_id)
                .fetch_optional(self.db.pool())
                .await
            }
        }
        .map_err(|err| map_sqlx("report_assignments", err))?;

        Ok(row.as_ref().map(assignment_from_row))
    }

    async fn find_assignments_by_moderator(
        &self,
        moderator_id: &str,
    ) -> Result<Vec<Assignment>, StoreError> {
        let rows = sqlx::query(
            "SELECT report_id, moderator_id, assigned_at \
             FROM report_assignments \
             WHERE moderator_id = $1 \
             ORDER BY assigned_at DESC",
        )
        .bind(moderator_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|err| map_sqlx("report_assignments", err))?;

        Ok(rows.iter().map(assignment_from_row).collect())
    }

    async fn find_all_assigned_report_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query("SELECT report_id FROM report_assignments")
            .fetch_all(self.db.pool())
            .await
            .map_err(|err| map_sqlx("report_assignments", err))?;

        Ok(rows.iter().map(|row| row.get("report_id")).collect())
    }

    async fn create_assignment(
        &self,
        report_id: Uuid,
        moderator_id: &str,
    ) -> Result<Assignment, StoreError> {
        let row = sqlx::query(
            "INSERT INTO report_assignments (report_id, moderator_id) \
             VALUES ($1, $2) \
             RETURNING report_id, moderator_id, assigned_at",
        )
        .bind(report_id)
        .bind(moderator_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| map_sqlx("report_assignments", err))?;

        Ok(assignment_from_row(&row))
    }

    async fn delete_assignment(
        &self,
        report_id: Uuid,
        moderator_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM report_assignments \
             WHERE report_id = $1 AND moderator_id = $2",
        )
        .bind(report_id)
        .bind(moderator_id)
        .execute(self.db.pool())
        .await
        .map_err(|err| map_sqlx("report_assignments", err))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_moderator(&self, user_id: &str) -> Result<Option<Moderator>, StoreError> {
        let row = sqlx::query(
            "SELECT user_id, full_name, email, image_url, created_at \
             FROM moderators WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|err| map_sqlx("moderators", err))?;

        Ok(row.as_ref().map(moderator_from_row))
    }

    async fn insert_moderator(&self, user_id: &str) -> Result<Moderator, StoreError> {
        let row = sqlx::query(
            "INSERT INTO moderators (user_id) VALUES ($1) \
             RETURNING user_id, full_name, email, image_url, created_at",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| map_sqlx("moderators", err))?;

        Ok(moderator_from_row(&row))
    }
}
