use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tally_core::config::MailConfig;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::format::ReportPayload;

/// A rendered report addressed to its recipients.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub csv: String,
    pub csv_filename: String,
}

impl ReportEmail {
    /// Render `payload` for `recipients`, a comma-separated address list.
    pub fn compose(
        recipients: &str,
        subject_prefix: &str,
        company_id: &str,
        payload: &ReportPayload,
    ) -> Result<Self, DeliveryError> {
        let to: Vec<String> = recipients
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if to.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }

        Ok(Self {
            to,
            subject: format!("{subject_prefix} - {company_id}"),
            text: payload.to_text(),
            csv: payload.to_csv(),
            csv_filename: format!("balance_sheet_{company_id}_{}.csv", payload.as_of),
        })
    }
}

/// Email transport. Implementations do not retry or queue.
#[async_trait]
pub trait ReportMailer: Send + Sync {
    async fn send(&self, email: &ReportEmail) -> Result<(), DeliveryError>;
}

/// Sends through the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

impl ResendMailer {
    pub fn new(api_url: &str, api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }

    pub fn from_config(config: &MailConfig) -> Result<Self, DeliveryError> {
        let key = config
            .resend_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DeliveryError::NotConfigured("mail.resend_api_key is not set".into()))?;
        Ok(Self::new(&config.api_url, key, config.from.clone()))
    }
}

#[async_trait]
impl ReportMailer for ResendMailer {
    async fn send(&self, email: &ReportEmail) -> Result<(), DeliveryError> {
        let attachment = base64::engine::general_purpose::STANDARD.encode(email.csv.as_bytes());
        let body = serde_json::json!({
            "from": self.from,
            "to": email.to,
            "subject": email.subject,
            "text": email.text,
            "attachments": [{
                "filename": email.csv_filename,
                "content": attachment,
            }],
        });

        let resp = self
            .client
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "mail API rejected report email");
            return Err(DeliveryError::Rejected {
                status,
                message: text,
            });
        }

        let id = resp
            .json::<SendResponse>()
            .await
            .ok()
            .and_then(|r| r.id)
            .unwrap_or_default();
        info!(message_id = %id, recipients = email.to.len(), "report email sent");
        Ok(())
    }
}

/// Logs the email instead of sending it; used for dry runs.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl ReportMailer for LogMailer {
    async fn send(&self, email: &ReportEmail) -> Result<(), DeliveryError> {
        info!(
            to = %email.to.join(","),
            subject = %email.subject,
            attachment = %email.csv_filename,
            "dry run: report email not sent"
        );
        debug!(body = %email.text, "dry run email body");
        Ok(())
    }
}
