use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Resolves a bearer credential to a stable user identifier. Token
/// verification lives entirely with the external identity provider; this
/// core treats tokens as opaque.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` when the credential does not resolve to a user.
    async fn resolve(&self, bearer_token: &str) -> Result<Option<String>>;
}

#[derive(Clone)]
pub struct HttpIdentityResolver {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct UserInfo {
    id: String,
}

impl HttpIdentityResolver {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, bearer_token: &str) -> Result<Option<String>> {
        let url = format!("{}/user", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer_token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(None);
        }

        let info: UserInfo = response.error_for_status()?.json().await?;
        if info.id.is_empty() {
            return Ok(None);
        }

        Ok(Some(info.id))
    }
}
