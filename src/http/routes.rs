use axum::{routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn reports() -> Router<AppState> {
    Router::new()
        .route("/reports", post(handlers::create_report))
        .route("/reports", get(handlers::list_reports))
        .route("/reports/available", get(handlers::list_available_reports))
        .route("/reports/assigned", get(handlers::list_assigned_reports))
        .route("/reports/completed", get(handlers::list_completed_reports))
        .route("/reports/:id/assign", post(handlers::assign_report))
        .route("/reports/:id/unassign", post(handlers::unassign_report))
        .route("/reports/:id/review", post(handlers::review_report))
}
