#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use sygnal::app::reports::{
    NewReportInput, PdfUpload, ReportService, WorkflowError,
};
use sygnal::domain::assignment::Assignment;
use sygnal::domain::moderator::Moderator;
use sygnal::domain::report::Report;
use sygnal::infra::email::Notifier;
use sygnal::infra::repository::{NewReport, ReportRepository, StoreError};
use sygnal::infra::storage::{BlobStore, UploadError};

// ---------------------------------------------------------------------------
// In-memory record store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RepoState {
    reports: HashMap<Uuid, Report>,
    moderators: HashMap<String, Moderator>,
    assignments: HashMap<Uuid, Assignment>,
}

/// Record-store double. Mirrors the Postgres implementation's contract:
/// shallow JSONB-style content merge, uniqueness on the assignment
/// relation, duplicate-key surfaced as `StoreError::UniqueViolation`.
/// The `fail_*` / `steal_*` knobs inject one-shot failures so tests can
/// force the partial-failure paths.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<RepoState>,
    clock: AtomicI64,
    /// Next report insert fails (after-upload compensation path).
    pub fail_next_create: AtomicBool,
    /// Next content merge fails (assignment rollback path).
    pub fail_next_update: AtomicBool,
    /// Next assignment insert behaves as if a concurrent assigner won the
    /// check-then-act race: the row appears under another moderator and
    /// the insert reports a unique violation.
    pub steal_next_assignment: AtomicBool,
    /// Next moderator insert behaves as if a concurrent caller created the
    /// row first: the row appears and the insert reports a duplicate key.
    pub duplicate_next_moderator_insert: AtomicBool,
}

impl InMemoryRepository {
    fn next_timestamp(&self) -> OffsetDateTime {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst);
        OffsetDateTime::now_utc() + Duration::microseconds(tick)
    }

    pub fn report(&self, id: Uuid) -> Option<Report> {
        self.state.lock().unwrap().reports.get(&id).cloned()
    }

    pub fn assignment(&self, report_id: Uuid) -> Option<Assignment> {
        self.state.lock().unwrap().assignments.get(&report_id).cloned()
    }

    pub fn assignment_count(&self) -> usize {
        self.state.lock().unwrap().assignments.len()
    }

    pub fn report_count(&self) -> usize {
        self.state.lock().unwrap().reports.len()
    }

    pub fn moderator_exists(&self, user_id: &str) -> bool {
        self.state.lock().unwrap().moderators.contains_key(user_id)
    }

    pub fn set_moderator_name(&self, user_id: &str, full_name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(moderator) = state.moderators.get_mut(user_id) {
            moderator.full_name = Some(full_name.to_string());
        }
    }

    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }
}

fn merge_content(content: &mut Value, patch: Value) {
    if let (Value::Object(content), Value::Object(patch)) = (content, patch) {
        for (key, value) in patch {
            content.insert(key, value);
        }
    }
}

#[async_trait]
impl ReportRepository for InMemoryRepository {
    async fn create(&self, new: NewReport) -> Result<Report, StoreError> {
        if Self::take(&self.fail_next_create) {
            return Err(StoreError::Unavailable(anyhow!("injected insert failure")));
        }

        let now = self.next_timestamp();
        let report = Report {
            id: Uuid::new_v4(),
            reporter_name: new.reporter_name,
            reporter_email: new.reporter_email,
            reported_institution: new.reported_institution,
            report_description: new.report_description,
            institution_name: new.institution_name,
            institution_id: new.institution_id,
            report_reason: new.report_reason,
            content: new.content,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .unwrap()
            .reports
            .insert(report.id, report.clone());
        Ok(report)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        Ok(self.report(id))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Report>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        let mut reports: Vec<Report> = ids
            .iter()
            .filter_map(|id| state.reports.get(id).cloned())
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn find_all(&self) -> Result<Vec<Report>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut reports: Vec<Report> = state.reports.values().cloned().collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn update_content(
        &self,
        id: Uuid,
        patch: Value,
    ) -> Result<Option<Report>, StoreError> {
        if Self::take(&self.fail_next_update) {
            return Err(StoreError::Unavailable(anyhow!("injected merge failure")));
        }

        let now = self.next_timestamp();
        let mut state = self.state.lock().unwrap();
        let Some(report) = state.reports.get_mut(&id) else {
            return Ok(None);
        };
        merge_content(&mut report.content, patch);
        report.updated_at = now;
        Ok(Some(report.clone()))
    }

    async fn find_assignment(
        &self,
        report_id: Uuid,
        moderator_id: Option<&str>,
    ) -> Result<Option<Assignment>, StoreError> {
        let state = self.state.lock().unwrap();
        let assignment = state.assignments.get(&report_id).cloned();
        Ok(match moderator_id {
            Some(moderator_id) => {
                assignment.filter(|a| a.moderator_id == moderator_id)
            }
            None => assignment,
        })
    }

    async fn find_assignments_by_moderator(
        &self,
        moderator_id: &str,
    ) -> Result<Vec<Assignment>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .values()
            .filter(|a| a.moderator_id == moderator_id)
            .cloned()
            .collect())
    }

    async fn find_all_assigned_report_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.assignments.keys().copied().collect())
    }

    async fn create_assignment(
        &self,
        report_id: Uuid,
        moderator_id: &str,
    ) -> Result<Assignment, StoreError> {
        let now = self.next_timestamp();
        let mut state = self.state.lock().unwrap();

        if Self::take(&self.steal_next_assignment) {
            state.assignments.insert(
                report_id,
                Assignment {
                    report_id,
                    moderator_id: "concurrent-winner".into(),
                    assigned_at: now,
                },
            );
            return Err(StoreError::UniqueViolation("report_assignments"));
        }

        if state.assignments.contains_key(&report_id) {
            return Err(StoreError::UniqueViolation("report_assignments"));
        }

        let assignment = Assignment {
            report_id,
            moderator_id: moderator_id.to_string(),
            assigned_at: now,
        };
        state.assignments.insert(report_id, assignment.clone());
        Ok(assignment)
    }

    async fn delete_assignment(
        &self,
        report_id: Uuid,
        moderator_id: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let owned = state
            .assignments
            .get(&report_id)
            .map_or(false, |a| a.moderator_id == moderator_id);
        if owned {
            state.assignments.remove(&report_id);
        }
        Ok(owned)
    }

    async fn find_moderator(&self, user_id: &str) -> Result<Option<Moderator>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.moderators.get(user_id).cloned())
    }

    async fn insert_moderator(&self, user_id: &str) -> Result<Moderator, StoreError> {
        let now = self.next_timestamp();
        let mut state = self.state.lock().unwrap();

        let moderator = Moderator {
            user_id: user_id.to_string(),
            full_name: None,
            email: None,
            image_url: None,
            created_at: now,
        };

        if Self::take(&self.duplicate_next_moderator_insert) {
            state
                .moderators
                .entry(user_id.to_string())
                .or_insert_with(|| moderator.clone());
            return Err(StoreError::UniqueViolation("moderators"));
        }

        if state.moderators.contains_key(user_id) {
            return Err(StoreError::UniqueViolation("moderators"));
        }

        state
            .moderators
            .insert(user_id.to_string(), moderator.clone());
        Ok(moderator)
    }
}

// ---------------------------------------------------------------------------
// In-memory blob store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, Bytes>>,
    pub fail_next_upload: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), UploadError> {
        if self.fail_next_upload.swap(false, Ordering::SeqCst) {
            return Err(UploadError::from(anyhow!("injected upload failure")));
        }

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(path) {
            return Err(UploadError::from(anyhow!("object already exists: {}", path)));
        }
        objects.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, paths: &[String]) -> Result<(), UploadError> {
        let mut objects = self.objects.lock().unwrap();
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recording notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CompletionCall {
    pub report_id: Uuid,
    pub reporter_email: String,
    pub review_notes: Option<String>,
    pub moderator_name: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<CompletionCall>>,
    pub fail_all: AtomicBool,
}

impl RecordingNotifier {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<CompletionCall> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn report_completed(
        &self,
        report: &Report,
        review_notes: Option<&str>,
        moderator_name: &str,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(CompletionCall {
            report_id: report.id,
            reporter_email: report.reporter_email.clone(),
            review_notes: review_notes.map(str::to_owned),
            moderator_name: moderator_name.to_string(),
        });

        if self.fail_all.load(Ordering::SeqCst) {
            return Err(anyhow!("injected notifier failure"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub service: ReportService,
    pub repository: Arc<InMemoryRepository>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness() -> TestHarness {
    let repository = Arc::new(InMemoryRepository::default());
    let blobs = Arc::new(InMemoryBlobStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = ReportService::new(
        repository.clone(),
        blobs.clone(),
        notifier.clone(),
    );

    TestHarness {
        service,
        repository,
        blobs,
        notifier,
    }
}

pub fn sample_input() -> NewReportInput {
    NewReportInput {
        reporter_name: "Jan Kowalski".into(),
        reporter_email: "jan.kowalski@example.com".into(),
        report_description: Some("description of the complaint".into()),
        ..NewReportInput::default()
    }
}

pub fn sample_pdf() -> PdfUpload {
    PdfUpload {
        bytes: Bytes::from_static(b"%PDF-1.4 minimal"),
        file_name: Some("skan-skargi.pdf".into()),
        content_type: Some("application/pdf".into()),
    }
}

/// Submit a report for institution `inst-42` and return its id.
pub async fn submit(harness: &TestHarness) -> Uuid {
    let input = NewReportInput {
        institution_id: Some("inst-42".into()),
        ..sample_input()
    };
    harness
        .service
        .create(input, sample_pdf())
        .await
        .expect("report creation failed")
        .report_id
}

pub fn expect_conflict<T: std::fmt::Debug>(
    result: Result<T, WorkflowError>,
    expected: &str,
) {
    match result {
        Err(WorkflowError::Conflict(message)) => assert_eq!(message, expected),
        other => panic!("expected conflict {:?}, got {:?}", expected, other),
    }
}
