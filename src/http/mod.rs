use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::{AuthUser, MaybeAuthUser};
pub use error::AppError;

pub fn router(state: AppState, upload_max_bytes: usize) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::reports())
        .layer(DefaultBodyLimit::max(upload_max_bytes))
        .with_state(state)
}
