use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics - Prometheus counters for the notification pipeline
// ============================================================================
//
// Scraped via GET /metrics on the main HTTP server.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    /// Inbound webhook events by type
    pub webhook_events: IntCounterVec,

    /// Outbound email attempts by notification kind
    pub emails_sent: IntCounterVec,
    pub emails_failed: IntCounterVec,

    /// Print vendor submissions by outcome
    pub print_submissions: IntCounterVec,

    /// Print-status updates applied to orders
    pub status_updates: IntCounter,

    /// Welcome emails by triggering mechanism
    pub welcome_sends: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let webhook_events = IntCounterVec::new(
            Opts::new("webhook_events_total", "Inbound webhook events received"),
            &["event"],
        )?;
        registry.register(Box::new(webhook_events.clone()))?;

        let emails_sent = IntCounterVec::new(
            Opts::new("emails_sent_total", "Emails accepted by the provider"),
            &["kind"],
        )?;
        registry.register(Box::new(emails_sent.clone()))?;

        let emails_failed = IntCounterVec::new(
            Opts::new("emails_failed_total", "Email sends that failed"),
            &["kind"],
        )?;
        registry.register(Box::new(emails_failed.clone()))?;

        let print_submissions = IntCounterVec::new(
            Opts::new("print_submissions_total", "Print vendor submissions"),
            &["outcome"],
        )?;
        registry.register(Box::new(print_submissions.clone()))?;

        let status_updates = IntCounter::new(
            "order_status_updates_total",
            "Print-status updates applied to orders",
        )?;
        registry.register(Box::new(status_updates.clone()))?;

        let welcome_sends = IntCounterVec::new(
            Opts::new("welcome_sends_total", "Welcome emails by trigger"),
            &["trigger"],
        )?;
        registry.register(Box::new(welcome_sends.clone()))?;

        Ok(Self {
            registry,
            webhook_events,
            emails_sent,
            emails_failed,
            print_submissions,
            status_updates,
            welcome_sends,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_webhook_event(&self, event: &str) {
        self.webhook_events.with_label_values(&[event]).inc();
    }

    pub fn record_email(&self, kind: &str, success: bool) {
        if success {
            self.emails_sent.with_label_values(&[kind]).inc();
        } else {
            self.emails_failed.with_label_values(&[kind]).inc();
        }
    }

    pub fn record_print_submission(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.print_submissions.with_label_values(&[outcome]).inc();
    }

    pub fn record_status_update(&self) {
        self.status_updates.inc();
    }

    pub fn record_welcome_send(&self, trigger: &str) {
        self.welcome_sends.with_label_values(&[trigger]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_email_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_email("orderReceived", true);
        metrics.record_email("orderReceived", true);
        metrics.record_email("orderReceived", false);

        let gathered = metrics.registry.gather();
        let sent = gathered
            .iter()
            .find(|m| m.name() == "emails_sent_total")
            .unwrap();
        assert_eq!(sent.metric[0].counter.value, Some(2.0));
        let failed = gathered
            .iter()
            .find(|m| m.name() == "emails_failed_total")
            .unwrap();
        assert_eq!(failed.metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_record_print_submission_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_print_submission(true);
        metrics.record_print_submission(false);

        let gathered = metrics.registry.gather();
        let submissions = gathered
            .iter()
            .find(|m| m.name() == "print_submissions_total")
            .unwrap();
        assert_eq!(submissions.metric.len(), 2);
    }
}
