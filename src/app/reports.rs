use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::moderators::ModeratorDirectory;
use crate::domain::report::{ReportStatus, ReportView};
use crate::infra::email::Notifier;
use crate::infra::repository::{NewReport, ReportRepository, StoreError};
use crate::infra::storage::{BlobStore, UploadError};

/// Workflow outcomes a caller must be able to tell apart. Validation,
/// NotFound, and Conflict propagate verbatim to the boundary; Upload and
/// Store are collaborator failures, logged with context here and surfaced
/// generically.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("report not found")]
    NotFound,
    #[error("{0}")]
    Conflict(&'static str),
    #[error("attachment upload failed")]
    Upload(#[source] UploadError),
    #[error("record store failure")]
    Store(#[source] StoreError),
}

#[derive(Debug, Clone, Default)]
pub struct NewReportInput {
    pub reporter_name: String,
    pub reporter_email: String,
    pub reported_institution: Option<String>,
    pub report_description: Option<String>,
    pub institution_name: Option<String>,
    pub institution_id: Option<String>,
    pub numer_rspo: Option<String>,
    pub report_reason: Option<String>,
    /// Caller-supplied seed for the open content document.
    pub content_seed: Option<Value>,
    pub submitted_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub bytes: Bytes,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedReport {
    pub report_id: Uuid,
    pub pdf_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewInput {
    pub comparison_notes: Option<String>,
    pub notes: Option<String>,
    pub findings: Option<Value>,
}

/// The report state machine:
///
/// ```text
/// pending --assign--> assigned --review--> completed
/// assigned --unassign--> pending
/// ```
///
/// Status is always derived from the content document; the assignment row
/// is the source of truth for ownership. There is no in-process locking:
/// the store's uniqueness constraint on the assignment relation is the
/// only mutual exclusion, and partial failures are rolled back with
/// best-effort compensating deletes rather than transactions.
#[derive(Clone)]
pub struct ReportService {
    repository: Arc<dyn ReportRepository>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    moderators: ModeratorDirectory,
}

impl ReportService {
    pub fn new(
        repository: Arc<dyn ReportRepository>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let moderators = ModeratorDirectory::new(repository.clone());
        Self {
            repository,
            blobs,
            notifier,
            moderators,
        }
    }

    /// Two-phase submission: upload the attachment, then insert the record.
    /// An insert failure deletes the just-uploaded blob before surfacing,
    /// so the blob store holds no orphans attributable to this call. A
    /// crash between the two steps still leaks the blob; nothing here
    /// reconciles that.
    pub async fn create(
        &self,
        input: NewReportInput,
        pdf: PdfUpload,
    ) -> Result<CreatedReport, WorkflowError> {
        if pdf.bytes.is_empty() {
            return Err(WorkflowError::Validation(
                "pdf attachment is required".into(),
            ));
        }

        let institution_ref = non_empty(&input.institution_id)
            .or_else(|| non_empty(&input.numer_rspo));
        let path = storage_path(institution_ref, pdf.file_name.as_deref());
        let content_type = pdf
            .content_type
            .as_deref()
            .unwrap_or("application/pdf")
            .to_string();

        self.blobs
            .upload(&path, pdf.bytes, &content_type)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, path = %path, "attachment upload failed");
                WorkflowError::Upload(err)
            })?;

        let mut content = match input.content_seed {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        content.insert("pdf_storage_path".into(), json!(path));
        if let Some(numer_rspo) = non_empty(&input.numer_rspo) {
            content.insert("numer_rspo".into(), json!(numer_rspo));
        }
        if let Some(submitted_by) = non_empty(&input.submitted_by) {
            content.insert("submitted_by_user_id".into(), json!(submitted_by));
        }

        let institution_id = non_empty(&input.institution_id)
            .or_else(|| non_empty(&input.numer_rspo))
            .or_else(|| non_empty(&input.reported_institution))
            .map(str::to_owned);

        let new = NewReport {
            reporter_name: input.reporter_name,
            reporter_email: input.reporter_email,
            reported_institution: input.reported_institution,
            report_description: input.report_description,
            institution_name: input.institution_name,
            institution_id: input.institution_id,
            report_reason: input.report_reason,
            content: Value::Object(content),
        };

        match self.repository.create(new).await {
            Ok(report) => Ok(CreatedReport {
                report_id: report.id,
                pdf_path: path,
                institution_id,
            }),
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    path = %path,
                    "report insert failed after upload, removing attachment"
                );
                if let Err(cleanup_err) = self.blobs.delete(&[path.clone()]).await {
                    tracing::error!(
                        error = ?cleanup_err,
                        path = %path,
                        "failed to remove orphaned attachment"
                    );
                }
                Err(WorkflowError::Store(err))
            }
        }
    }

    /// Every report, newest first. No assignment join: `assignedTo` in
    /// this projection comes only from the content document.
    pub async fn list_all(&self) -> Result<Vec<ReportView>, WorkflowError> {
        let reports = self.repository.find_all().await.map_err(|err| {
            tracing::error!(error = ?err, "failed to list reports");
            WorkflowError::Store(err)
        })?;

        Ok(reports
            .iter()
            .map(|report| ReportView::project(report, None, None))
            .collect())
    }

    pub async fn list_assigned_to(
        &self,
        user_id: &str,
    ) -> Result<Vec<ReportView>, WorkflowError> {
        self.list_for_moderator(user_id, ReportStatus::Assigned).await
    }

    pub async fn list_completed_by(
        &self,
        user_id: &str,
    ) -> Result<Vec<ReportView>, WorkflowError> {
        self.list_for_moderator(user_id, ReportStatus::Completed).await
    }

    async fn list_for_moderator(
        &self,
        user_id: &str,
        wanted: ReportStatus,
    ) -> Result<Vec<ReportView>, WorkflowError> {
        // An identity that never interacted with assignment has no
        // workload; that is an empty list, not an error.
        let moderator = match self.moderators.find(user_id).await.map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to look up moderator");
            WorkflowError::Store(err)
        })? {
            Some(moderator) => moderator,
            None => return Ok(Vec::new()),
        };

        let assignments = self
            .repository
            .find_assignments_by_moderator(&moderator.user_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %user_id, "failed to list assignments");
                WorkflowError::Store(err)
            })?;

        let ids: Vec<Uuid> = assignments.iter().map(|a| a.report_id).collect();
        let reports = self.repository.find_by_ids(&ids).await.map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to fetch assigned reports");
            WorkflowError::Store(err)
        })?;

        let by_report: HashMap<Uuid, &crate::domain::assignment::Assignment> =
            assignments.iter().map(|a| (a.report_id, a)).collect();

        Ok(reports
            .iter()
            .map(|report| {
                ReportView::project(report, by_report.get(&report.id).copied(), Some(user_id))
            })
            .filter(|view| view.status == wanted)
            .collect())
    }

    /// Reports open for claiming: no assignment row and derived status
    /// pending. Both checks run, in case the denormalized content disagrees
    /// with the assignment table.
    pub async fn list_available(&self) -> Result<Vec<ReportView>, WorkflowError> {
        let reports = self.repository.find_all().await.map_err(|err| {
            tracing::error!(error = ?err, "failed to list reports");
            WorkflowError::Store(err)
        })?;
        let assigned: HashSet<Uuid> = self
            .repository
            .find_all_assigned_report_ids()
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to list assigned report ids");
                WorkflowError::Store(err)
            })?
            .into_iter()
            .collect();

        Ok(reports
            .iter()
            .filter(|report| !assigned.contains(&report.id))
            .filter(|report| report.status() == ReportStatus::Pending)
            .map(|report| ReportView::project(report, None, None))
            .collect())
    }

    /// Claim a report for the acting moderator. The pre-check only exists
    /// to tell "already assigned to you" apart from "assigned to another
    /// moderator"; the real exclusion is the store's uniqueness constraint,
    /// and losing that race maps to the same conflict a late arriver sees.
    pub async fn assign(
        &self,
        report_id: Uuid,
        actor_id: &str,
    ) -> Result<String, WorkflowError> {
        self.repository
            .find_by_id(report_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, report_id = %report_id, "failed to load report");
                WorkflowError::Store(err)
            })?
            .ok_or(WorkflowError::NotFound)?;

        let moderator = self
            .moderators
            .ensure_moderator(actor_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %actor_id, "failed to resolve moderator");
                WorkflowError::Store(err)
            })?;

        if let Some(existing) = self
            .repository
            .find_assignment(report_id, None)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, report_id = %report_id, "failed to check assignment");
                WorkflowError::Store(err)
            })?
        {
            if existing.moderator_id == moderator.user_id {
                return Err(WorkflowError::Conflict("already assigned to you"));
            }
            return Err(WorkflowError::Conflict("assigned to another moderator"));
        }

        let assignment = match self
            .repository
            .create_assignment(report_id, &moderator.user_id)
            .await
        {
            Ok(assignment) => assignment,
            // Lost the check-then-act race: someone claimed the report
            // between our check and our insert.
            Err(StoreError::UniqueViolation(_)) => {
                return Err(WorkflowError::Conflict("assigned to another moderator"));
            }
            Err(err) => {
                tracing::error!(error = ?err, report_id = %report_id, "failed to create assignment");
                return Err(WorkflowError::Store(err));
            }
        };

        let patch = json!({
            "status": "assigned",
            "assigned_to": moderator.user_id,
            "assigned_at": assignment.assigned_at.format(&Rfc3339).ok(),
        });
        match self.repository.update_content(report_id, patch).await {
            Ok(Some(_)) => Ok(moderator.user_id),
            Ok(None) => {
                self.rollback_assignment(report_id, &moderator.user_id).await;
                Err(WorkflowError::NotFound)
            }
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    report_id = %report_id,
                    "content merge failed after assignment insert, rolling back"
                );
                self.rollback_assignment(report_id, &moderator.user_id).await;
                Err(WorkflowError::Store(err))
            }
        }
    }

    /// Release a report back to the pool. Requires the acting moderator to
    /// own the assignment row; a repeat unassign conflicts rather than
    /// silently succeeding.
    pub async fn unassign(
        &self,
        report_id: Uuid,
        actor_id: &str,
    ) -> Result<String, WorkflowError> {
        self.repository
            .find_by_id(report_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, report_id = %report_id, "failed to load report");
                WorkflowError::Store(err)
            })?
            .ok_or(WorkflowError::NotFound)?;

        let moderator = self
            .moderators
            .ensure_moderator(actor_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %actor_id, "failed to resolve moderator");
                WorkflowError::Store(err)
            })?;

        let owned = self
            .repository
            .find_assignment(report_id, Some(&moderator.user_id))
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, report_id = %report_id, "failed to check assignment");
                WorkflowError::Store(err)
            })?;
        if owned.is_none() {
            return Err(WorkflowError::Conflict("not assigned to you"));
        }

        let deleted = self
            .repository
            .delete_assignment(report_id, &moderator.user_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, report_id = %report_id, "failed to delete assignment");
                WorkflowError::Store(err)
            })?;
        if !deleted {
            // Raced with another unassign of the same row.
            return Err(WorkflowError::Conflict("not assigned to you"));
        }

        let patch = json!({
            "status": "pending",
            "assigned_to": null,
            "assigned_at": null,
        });
        self.repository
            .update_content(report_id, patch)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, report_id = %report_id, "failed to merge content");
                WorkflowError::Store(err)
            })?;

        Ok(moderator.user_id)
    }

    /// Complete a report. Ownership is required exactly as in `unassign`.
    /// The merge writes `status`, `completed_at`, the effective review
    /// notes (structured field first, legacy free text second), and any
    /// supplied findings/notes; omitted fields keep their stored values.
    /// The completion email is fire-and-forget: a notifier failure is
    /// logged and swallowed, never undoing the review.
    pub async fn review(
        &self,
        report_id: Uuid,
        actor_id: &str,
        input: ReviewInput,
    ) -> Result<(), WorkflowError> {
        self.repository
            .find_by_id(report_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, report_id = %report_id, "failed to load report");
                WorkflowError::Store(err)
            })?
            .ok_or(WorkflowError::NotFound)?;

        let moderator = self
            .moderators
            .ensure_moderator(actor_id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, user_id = %actor_id, "failed to resolve moderator");
                WorkflowError::Store(err)
            })?;

        let owned = self
            .repository
            .find_assignment(report_id, Some(&moderator.user_id))
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, report_id = %report_id, "failed to check assignment");
                WorkflowError::Store(err)
            })?;
        if owned.is_none() {
            return Err(WorkflowError::Conflict("not assigned to you"));
        }

        let mut patch = Map::new();
        patch.insert("status".into(), json!("completed"));
        patch.insert(
            "completed_at".into(),
            json!(OffsetDateTime::now_utc().format(&Rfc3339).ok()),
        );

        let review_notes = input
            .comparison_notes
            .as_deref()
            .filter(|notes| !notes.is_empty())
            .or_else(|| input.notes.as_deref().filter(|notes| !notes.is_empty()));
        if let Some(review_notes) = review_notes {
            patch.insert("review_notes".into(), json!(review_notes));
        }
        if let Some(findings) = input.findings {
            patch.insert("findings".into(), findings);
        }
        if let Some(notes) = input.notes.as_deref().filter(|notes| !notes.is_empty()) {
            patch.insert("notes".into(), json!(notes));
        }

        let updated = self
            .repository
            .update_content(report_id, Value::Object(patch))
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, report_id = %report_id, "failed to merge review");
                WorkflowError::Store(err)
            })?
            .ok_or(WorkflowError::NotFound)?;

        let effective_notes = updated.content_str("review_notes").map(str::to_owned);
        if let Err(err) = self
            .notifier
            .report_completed(
                &updated,
                effective_notes.as_deref(),
                moderator.display_name(),
            )
            .await
        {
            tracing::error!(error = ?err, report_id = %report_id, "completion notification failed");
        }

        Ok(())
    }

    async fn rollback_assignment(&self, report_id: Uuid, moderator_id: &str) {
        if let Err(err) = self
            .repository
            .delete_assignment(report_id, moderator_id)
            .await
        {
            tracing::error!(
                error = ?err,
                report_id = %report_id,
                "failed to roll back assignment row"
            );
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// `{institution|"unassigned"}/{YYYY-MM-DD}/{random}{ext}`: grouped by
/// institution and calendar day so the blob namespace stays scannable. The
/// random id is the actual uniqueness guarantee.
fn storage_path(institution_ref: Option<&str>, file_name: Option<&str>) -> String {
    let group = institution_ref.unwrap_or("unassigned");
    let day = OffsetDateTime::now_utc().date();
    let extension = file_name
        .and_then(|name| name.rfind('.').map(|dot| &name[dot..]))
        .filter(|ext| ext.len() > 1)
        .unwrap_or(".pdf");

    format!("{}/{}/{}{}", group, day, Uuid::new_v4(), extension)
}
