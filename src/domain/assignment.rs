use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Exclusive-ownership binding between one report and one moderator. The
/// store guarantees at most one row per report; this row, not the
/// `assigned_to` mirror inside the report content, is the source of truth
/// for who owns a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub report_id: Uuid,
    pub moderator_id: String,
    pub assigned_at: OffsetDateTime,
}
