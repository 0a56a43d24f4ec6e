use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A resolved user identity authorized to own and resolve reports. The id
/// is the identity provider's stable subject, created lazily the first
/// time that identity touches assignment; display fields are filled in
/// elsewhere and may stay empty forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moderator {
    pub user_id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    pub created_at: OffsetDateTime,
}

impl Moderator {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.user_id)
    }
}
