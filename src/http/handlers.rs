use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::app::reports::{
    CreatedReport, NewReportInput, PdfUpload, ReportService, ReviewInput,
};
use crate::domain::report::ReportView;
use crate::http::{AppError, AuthUser, MaybeAuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
    pub message: &'static str,
    pub report_id: Uuid,
    pub moderator_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub message: &'static str,
    pub report_id: Uuid,
    pub status: &'static str,
}

fn report_service(state: &AppState) -> ReportService {
    ReportService::new(
        state.repository.clone(),
        state.blobs.clone(),
        state.notifier.clone(),
    )
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

pub async fn create_report(
    State(state): State<AppState>,
    MaybeAuthUser(submitted_by): MaybeAuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedReport>), AppError> {
    let mut input = NewReportInput {
        submitted_by,
        ..NewReportInput::default()
    };
    let mut pdf: Option<PdfUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::bad_request("malformed multipart body"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pdf" => {
                let file_name = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::bad_request("failed to read attachment"))?;
                pdf = Some(PdfUpload {
                    bytes,
                    file_name,
                    content_type,
                });
            }
            "reporter_name" => input.reporter_name = text_field(field).await?,
            "reporter_email" => input.reporter_email = text_field(field).await?,
            "reported_institution" => {
                input.reported_institution = Some(text_field(field).await?)
            }
            "report_description" => input.report_description = Some(text_field(field).await?),
            "institution_name" => input.institution_name = Some(text_field(field).await?),
            "institution_id" => input.institution_id = Some(text_field(field).await?),
            "numer_rspo" => input.numer_rspo = Some(text_field(field).await?),
            "report_reason" => input.report_reason = Some(text_field(field).await?),
            "content" => {
                let raw = text_field(field).await?;
                let seed: Value = serde_json::from_str(&raw)
                    .map_err(|_| AppError::bad_request("content must be a JSON object"))?;
                if !seed.is_object() {
                    return Err(AppError::bad_request("content must be a JSON object"));
                }
                input.content_seed = Some(seed);
            }
            _ => {}
        }
    }

    if input.reporter_name.trim().is_empty() {
        return Err(AppError::bad_request("reporter_name is required"));
    }
    if input.reporter_email.trim().is_empty() {
        return Err(AppError::bad_request("reporter_email is required"));
    }
    let pdf = pdf.ok_or_else(|| AppError::bad_request("pdf attachment is required"))?;

    let created = report_service(&state).create(input, pdf).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|_| AppError::bad_request("malformed multipart field"))
}

pub async fn list_reports(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<ReportView>>, AppError> {
    let reports = report_service(&state).list_all().await?;
    Ok(Json(reports))
}

pub async fn list_available_reports(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<ReportView>>, AppError> {
    let reports = report_service(&state).list_available().await?;
    Ok(Json(reports))
}

pub async fn list_assigned_reports(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ReportView>>, AppError> {
    let reports = report_service(&state).list_assigned_to(&user.user_id).await?;
    Ok(Json(reports))
}

pub async fn list_completed_reports(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ReportView>>, AppError> {
    let reports = report_service(&state)
        .list_completed_by(&user.user_id)
        .await?;
    Ok(Json(reports))
}

pub async fn assign_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(report_id): Path<Uuid>,
) -> Result<Json<AssignmentResponse>, AppError> {
    let moderator_id = report_service(&state).assign(report_id, &user.user_id).await?;
    Ok(Json(AssignmentResponse {
        message: "report assigned",
        report_id,
        moderator_id,
    }))
}

pub async fn unassign_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(report_id): Path<Uuid>,
) -> Result<Json<AssignmentResponse>, AppError> {
    let moderator_id = report_service(&state)
        .unassign(report_id, &user.user_id)
        .await?;
    Ok(Json(AssignmentResponse {
        message: "report unassigned",
        report_id,
        moderator_id,
    }))
}

pub async fn review_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(report_id): Path<Uuid>,
    Json(payload): Json<ReviewInput>,
) -> Result<Json<ReviewResponse>, AppError> {
    report_service(&state)
        .review(report_id, &user.user_id, payload)
        .await?;
    Ok(Json(ReviewResponse {
        message: "report reviewed",
        report_id,
        status: "completed",
    }))
}
