use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::http::AppError;
use crate::AppState;

/// The calling identity, as resolved by the external identity provider.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Optional variant for endpoints reachable without an account: a missing
/// or unresolvable credential degrades to `None` instead of rejecting.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<String>);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;

        let user_id = state.identity.resolve(token).await.map_err(|err| {
            tracing::error!(error = ?err, "identity resolution failed");
            AppError::internal("failed to authenticate")
        })?;

        let user_id = user_id.ok_or_else(|| AppError::unauthorized("invalid token"))?;
        Ok(AuthUser { user_id })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeAuthUser(None));
        };

        match state.identity.resolve(token).await {
            Ok(user_id) => Ok(MaybeAuthUser(user_id)),
            Err(err) => {
                tracing::debug!(error = ?err, "ignoring unresolvable bearer token");
                Ok(MaybeAuthUser(None))
            }
        }
    }
}
