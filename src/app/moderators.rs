use anyhow::anyhow;
use std::sync::Arc;

use crate::domain::moderator::Moderator;
use crate::infra::repository::{ReportRepository, StoreError};

/// Translates a resolved identity into a moderator record, creating a
/// minimal row the first time that identity interacts with assignment.
#[derive(Clone)]
pub struct ModeratorDirectory {
    repository: Arc<dyn ReportRepository>,
}

impl ModeratorDirectory {
    pub fn new(repository: Arc<dyn ReportRepository>) -> Self {
        Self { repository }
    }

    /// Plain lookup; an identity that never touched assignment has no row.
    pub async fn find(&self, user_id: &str) -> Result<Option<Moderator>, StoreError> {
        self.repository.find_moderator(user_id).await
    }

    /// Get-or-create, idempotent under concurrent callers: a duplicate-key
    /// failure on the insert means someone else created the row first, so
    /// it is retried once as a lookup rather than surfaced.
    pub async fn ensure_moderator(&self, user_id: &str) -> Result<Moderator, StoreError> {
        if let Some(moderator) = self.repository.find_moderator(user_id).await? {
            return Ok(moderator);
        }

        match self.repository.insert_moderator(user_id).await {
            Ok(moderator) => Ok(moderator),
            Err(StoreError::UniqueViolation(_)) => self
                .repository
                .find_moderator(user_id)
                .await?
                .ok_or_else(|| {
                    StoreError::Unavailable(anyhow!(
                        "moderator {} missing after duplicate-key insert",
                        user_id
                    ))
                }),
            Err(err) => Err(err),
        }
    }
}
