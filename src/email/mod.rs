mod content;
mod mandrill;

pub use content::{format_currency, MergeField, NotificationContent};
pub use mandrill::MandrillGateway;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::TemplateConfig;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::models::NotificationKind;

// ============================================================================
// Notification Gateway - capability interface over transactional email
// ============================================================================

/// A single outbound email. Exactly one provider call per send; retries, if
/// ever wanted, belong to the caller.
#[derive(Clone, Debug)]
pub struct OutboundEmail {
    pub to: String,
    pub from: String,
    pub body: EmailBody,
}

#[derive(Clone, Debug)]
pub enum EmailBody {
    /// Provider-side template resolved by name; fields substituted there.
    Template {
        name: String,
        subject: String,
        merge_fields: Vec<MergeField>,
    },
    /// Verbatim subject + HTML, caller has already interpolated values.
    Raw { subject: String, html: String },
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
}

// ============================================================================
// Notifier - kind-aware dispatch with uniform template fallback
// ============================================================================
//
// Every notification kind goes through the same path: if a template name is
// configured for the kind, send template-driven; otherwise degrade to the
// raw-HTML rendering. The fallback is uniform rather than per-kind.
//
// ============================================================================

pub struct Notifier {
    gateway: Arc<dyn NotificationGateway>,
    from_email: String,
    admin_email: String,
    templates: TemplateConfig,
    metrics: Arc<Metrics>,
}

impl Notifier {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        from_email: String,
        admin_email: String,
        templates: TemplateConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gateway,
            from_email,
            admin_email,
            templates,
            metrics,
        }
    }

    /// Send a notification to the configured admin recipient.
    pub async fn send_to_admin(&self, content: NotificationContent) -> Result<()> {
        let admin = self.admin_email.clone();
        self.send_to(&admin, content).await
    }

    /// Send a notification to an arbitrary recipient.
    pub async fn send_to(&self, to: &str, content: NotificationContent) -> Result<()> {
        let kind = content.kind();

        let body = match self.template_for(kind) {
            Some(template_name) => EmailBody::Template {
                name: template_name.to_string(),
                subject: content.subject(),
                merge_fields: content.merge_fields(),
            },
            None => EmailBody::Raw {
                subject: content.subject(),
                html: content.html(),
            },
        };

        let email = OutboundEmail {
            to: to.to_string(),
            from: self.from_email.clone(),
            body,
        };

        let result = self.gateway.send(&email).await;

        match &result {
            Ok(()) => {
                self.metrics.record_email(kind.tag(), true);
                tracing::info!(to = %to, kind = kind.tag(), "Notification sent");
            }
            Err(e) => {
                self.metrics.record_email(kind.tag(), false);
                tracing::error!(to = %to, kind = kind.tag(), error = %e, "Notification send failed");
            }
        }

        result
    }

    fn template_for(&self, kind: NotificationKind) -> Option<&str> {
        let t = &self.templates;
        match kind {
            NotificationKind::Registration => t.registration.as_deref(),
            NotificationKind::OrderReceived => t.order_received.as_deref(),
            NotificationKind::Shipped => t.order_shipped.as_deref(),
            NotificationKind::BookDownload => t.book_download.as_deref(),
            NotificationKind::PasswordReset => t.forgot_password.as_deref(),
            // Admin and payment-failure mail has no provider template; always raw.
            NotificationKind::AdminNewOrder | NotificationKind::PaymentFailed => None,
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Gateway double that records every send and can be told to fail.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub sent: Mutex<Vec<OutboundEmail>>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl RecordingGateway {
        pub fn failing() -> Self {
            let gateway = Self::default();
            gateway.fail.store(true, std::sync::atomic::Ordering::SeqCst);
            gateway
        }

        pub async fn sent_count(&self) -> usize {
            self.sent.lock().await.len()
        }
    }

    #[async_trait]
    impl NotificationGateway for RecordingGateway {
        async fn send(&self, email: &OutboundEmail) -> Result<()> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(crate::error::SidecarError::Delivery(
                    "provider rejected".to_string(),
                ));
            }
            self.sent.lock().await.push(email.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingGateway;
    use super::*;

    fn notifier(gateway: Arc<RecordingGateway>, templates: TemplateConfig) -> Notifier {
        Notifier::new(
            gateway,
            "orders@bindery.example".to_string(),
            "admin@bindery.example".to_string(),
            templates,
            Arc::new(Metrics::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_raw_fallback_when_no_template_configured() {
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = notifier(gateway.clone(), TemplateConfig::default());

        notifier
            .send_to(
                "reader@example.com",
                NotificationContent::BookDownload {
                    customer_name: "Ada".to_string(),
                    book_title: "Test Recipe Book".to_string(),
                },
            )
            .await
            .unwrap();

        let sent = gateway.sent.lock().await;
        assert_eq!(sent.len(), 1);
        match &sent[0].body {
            EmailBody::Raw { subject, html } => {
                assert_eq!(subject, "Book Download Ready");
                assert!(html.contains("Test Recipe Book"));
            }
            EmailBody::Template { .. } => panic!("expected raw fallback"),
        }
    }

    #[tokio::test]
    async fn test_template_used_when_configured() {
        let gateway = Arc::new(RecordingGateway::default());
        let templates = TemplateConfig {
            book_download: Some("book-ready-v2".to_string()),
            ..Default::default()
        };
        let notifier = notifier(gateway.clone(), templates);

        notifier
            .send_to(
                "reader@example.com",
                NotificationContent::BookDownload {
                    customer_name: "Ada".to_string(),
                    book_title: "Test Recipe Book".to_string(),
                },
            )
            .await
            .unwrap();

        let sent = gateway.sent.lock().await;
        match &sent[0].body {
            EmailBody::Template {
                name, merge_fields, ..
            } => {
                assert_eq!(name, "book-ready-v2");
                assert!(merge_fields.iter().any(|f| f.name == "book_title"));
            }
            EmailBody::Raw { .. } => panic!("expected template send"),
        }
    }

    #[tokio::test]
    async fn test_admin_send_goes_to_admin_address() {
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = notifier(gateway.clone(), TemplateConfig::default());

        notifier
            .send_to_admin(NotificationContent::Welcome {
                customer_name: "ignored".to_string(),
            })
            .await
            .unwrap();

        let sent = gateway.sent.lock().await;
        assert_eq!(sent[0].to, "admin@bindery.example");
    }

    #[tokio::test]
    async fn test_delivery_failure_is_returned_to_caller() {
        let gateway = Arc::new(RecordingGateway::failing());
        let notifier = notifier(gateway, TemplateConfig::default());

        let result = notifier
            .send_to(
                "reader@example.com",
                NotificationContent::Welcome {
                    customer_name: "Ada".to_string(),
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(crate::error::SidecarError::Delivery(_))
        ));
    }
}
