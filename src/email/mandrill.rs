use async_trait::async_trait;
use serde_json::json;

use crate::email::{EmailBody, NotificationGateway, OutboundEmail};
use crate::error::{Result, SidecarError};

// ============================================================================
// Mandrill Gateway - Mailchimp Transactional over HTTP
// ============================================================================
//
// Constructed once at process start and shared by reference. A missing API
// key is a ConfigurationError at send time, never a startup crash: the
// webhook surface stays up with email degraded.
//
// ============================================================================

pub struct MandrillGateway {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl MandrillGateway {
    pub fn new(api_key: Option<String>, base_url: String) -> Self {
        if api_key.is_none() {
            tracing::warn!("MAILCHIMP_TRANSACTIONAL_API_KEY is not set; email sends will degrade");
        }
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl NotificationGateway for MandrillGateway {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            SidecarError::Configuration("MAILCHIMP_TRANSACTIONAL_API_KEY is not set".to_string())
        })?;

        let (path, payload) = match &email.body {
            EmailBody::Raw { subject, html } => (
                "/messages/send.json",
                json!({
                    "key": api_key,
                    "message": {
                        "from_email": email.from,
                        "to": [{ "email": email.to, "type": "to" }],
                        "subject": subject,
                        "html": html,
                    },
                }),
            ),
            EmailBody::Template {
                name,
                subject,
                merge_fields,
            } => (
                "/messages/send-template.json",
                json!({
                    "key": api_key,
                    "template_name": name,
                    "template_content": [],
                    "message": {
                        "from_email": email.from,
                        "to": [{ "email": email.to, "type": "to" }],
                        "subject": subject,
                        "global_merge_vars": merge_fields,
                        "merge_language": "mailchimp",
                    },
                }),
            ),
        };

        let url = format!("{}{}", self.base_url, path);

        // Exactly one outbound call; no retry inside the gateway.
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SidecarError::Delivery(format!("mandrill request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SidecarError::Delivery(format!(
                "mandrill rejected send: {status} {body}"
            )));
        }

        tracing::debug!(to = %email.to, "Mandrill accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_is_configuration_error() {
        let gateway = MandrillGateway::new(None, "https://mandrillapp.com/api/1.0".to_string());
        let email = OutboundEmail {
            to: "reader@example.com".to_string(),
            from: "orders@bindery.example".to_string(),
            body: EmailBody::Raw {
                subject: "Hello".to_string(),
                html: "<p>Hello</p>".to_string(),
            },
        };

        let result = gateway.send(&email).await;
        assert!(matches!(result, Err(SidecarError::Configuration(_))));
    }
}
