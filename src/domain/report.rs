use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::assignment::Assignment;

/// A submitted complaint case. Fixed columns carry the reporter and
/// institution metadata; `content` is an open JSON document and is the
/// authoritative holder of workflow state (`status`, `assigned_to`,
/// `assigned_at`, `completed_at`, `review_notes`, `findings`,
/// `pdf_storage_path`). `content` is merged on every transition, never
/// replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub reporter_name: String,
    pub reporter_email: String,
    pub reported_institution: Option<String>,
    pub report_description: Option<String>,
    pub institution_name: Option<String>,
    pub institution_id: Option<String>,
    pub report_reason: Option<String>,
    pub content: Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Report {
    /// Non-empty string value stored under `key` in the content document.
    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn status(&self) -> ReportStatus {
        ReportStatus::from_content(&self.content)
    }
}

/// Workflow state, always derived from the content document. Legacy or
/// hand-edited documents may carry anything under `status`; unknown shapes
/// derive `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Assigned,
    Completed,
}

impl ReportStatus {
    pub fn from_content(content: &Value) -> Self {
        match content.get("status").and_then(Value::as_str) {
            Some("assigned") => Self::Assigned,
            Some("completed") => Self::Completed,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
        }
    }
}

/// External response shape for a report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub id: Uuid,
    pub reporter_name: String,
    pub reporter_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_institution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numer_rspo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_reason: Option<String>,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_at: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
}

impl ReportView {
    /// Project a report for a list response.
    ///
    /// `assignment` is the caller's assignment row when the projection runs
    /// inside a "mine" view; it supplies `assigned_at` when the content
    /// document lacks one. `caller` is the requesting identity, used only
    /// as the last-resort `assigned_to` in those same views.
    pub fn project(
        report: &Report,
        assignment: Option<&Assignment>,
        caller: Option<&str>,
    ) -> Self {
        let status = report.status();

        let assigned_to = match status {
            ReportStatus::Pending => None,
            _ => report
                .content_str("assigned_to")
                .map(str::to_owned)
                .or_else(|| assignment.map(|a| a.moderator_id.clone()))
                .or_else(|| caller.map(str::to_owned)),
        };

        let assigned_at = match status {
            ReportStatus::Pending => None,
            _ => Some(
                parse_stored_timestamp(report.content_str("assigned_at"))
                    .or_else(|| assignment.map(|a| a.assigned_at))
                    .unwrap_or_else(OffsetDateTime::now_utc),
            ),
        };

        let completed_at = match status {
            ReportStatus::Completed => {
                Some(lenient_timestamp(report.content_str("completed_at")))
            }
            _ => None,
        };

        Self {
            id: report.id,
            reporter_name: report.reporter_name.clone(),
            reporter_email: report.reporter_email.clone(),
            reported_institution: report.reported_institution.clone(),
            institution_name: report.institution_name.clone(),
            institution_id: report.institution_id.clone(),
            numer_rspo: report.content_str("numer_rspo").map(str::to_owned),
            report_description: report.report_description.clone(),
            report_reason: report.report_reason.clone(),
            status,
            assigned_to,
            assigned_at,
            completed_at,
            created_at: report.created_at,
            updated_at: report.updated_at,
            pdf_path: report.content_str("pdf_storage_path").map(str::to_owned),
        }
    }
}

fn parse_stored_timestamp(raw: Option<&str>) -> Option<OffsetDateTime> {
    raw.and_then(|value| OffsetDateTime::parse(value, &Rfc3339).ok())
}

/// Stored dates inside the content document are free-form strings. An
/// absent or unparseable value projects as "now" rather than null; callers
/// depend on every completed report carrying a concrete timestamp.
pub fn lenient_timestamp(raw: Option<&str>) -> OffsetDateTime {
    parse_stored_timestamp(raw).unwrap_or_else(OffsetDateTime::now_utc)
}
