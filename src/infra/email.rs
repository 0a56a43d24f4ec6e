use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::report::Report;

/// Completion email, fire-and-forget from the workflow's perspective. The
/// engine logs failures and never lets them block or undo a review.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn report_completed(
        &self,
        report: &Report,
        review_notes: Option<&str>,
        moderator_name: &str,
    ) -> Result<()>;
}

/// Delivers mail through an external portal service: one POST with the
/// target address, subject, and plain/html bodies.
#[derive(Clone)]
pub struct EmailPortal {
    client: reqwest::Client,
    portal_url: String,
}

impl EmailPortal {
    pub fn new(portal_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            portal_url,
        }
    }
}

#[async_trait]
impl Notifier for EmailPortal {
    async fn report_completed(
        &self,
        report: &Report,
        review_notes: Option<&str>,
        moderator_name: &str,
    ) -> Result<()> {
        let institution = report
            .institution_name
            .as_deref()
            .or(report.reported_institution.as_deref())
            .unwrap_or("the reported institution");

        let body = match review_notes {
            Some(notes) => format!(
                "Your report about {} has been reviewed by {}.\n\nReview notes: {}",
                institution, moderator_name, notes
            ),
            None => format!(
                "Your report about {} has been reviewed by {}.",
                institution, moderator_name
            ),
        };
        let html = format!(
            "<p>Your report about <b>{}</b> has been reviewed by {}.</p>{}",
            institution,
            moderator_name,
            review_notes
                .map(|notes| format!("<p>Review notes: {}</p>", notes))
                .unwrap_or_default()
        );

        let mut payload = HashMap::new();
        payload.insert("target", report.reporter_email.clone());
        payload.insert("subject", "Your report has been reviewed".to_string());
        payload.insert("body", body);
        payload.insert("html", html);

        let response = self
            .client
            .post(&self.portal_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "email portal rejected the message: {}",
                response.status()
            ));
        }

        Ok(())
    }
}
