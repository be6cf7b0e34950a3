use std::env;
use std::time::Duration;

// ============================================================================
// Environment Configuration
// ============================================================================
//
// All runtime configuration is read once at startup. A missing email
// credential must NOT abort the process: sends degrade to a configuration
// error at call time instead (the webhook surface stays up).
//
// ============================================================================

/// Per-notification-kind Mandrill template names.
///
/// Any kind without a configured template falls back to a raw-HTML send.
#[derive(Clone, Debug, Default)]
pub struct TemplateConfig {
    pub welcome: Option<String>,
    pub order_received: Option<String>,
    pub order_shipped: Option<String>,
    pub forgot_password: Option<String>,
    pub registration: Option<String>,
    pub sms_signup: Option<String>,
    pub terms: Option<String>,
    pub privacy: Option<String>,
    pub bulk_forgot_password: Option<String>,
    pub book_download: Option<String>,
}

impl TemplateConfig {
    fn from_env() -> Self {
        Self {
            welcome: opt_env("MANDRILL_TEMPLATE_WELCOME"),
            order_received: opt_env("MANDRILL_TEMPLATE_ORDER_RECEIVED"),
            order_shipped: opt_env("MANDRILL_TEMPLATE_ORDER_SHIPPED"),
            forgot_password: opt_env("MANDRILL_TEMPLATE_FORGOT_PASSWORD"),
            registration: opt_env("MANDRILL_TEMPLATE_REGISTRATION"),
            sms_signup: opt_env("MANDRILL_TEMPLATE_SMS_SIGNUP"),
            terms: opt_env("MANDRILL_TEMPLATE_TERMS"),
            privacy: opt_env("MANDRILL_TEMPLATE_PRIVACY"),
            bulk_forgot_password: opt_env("MANDRILL_TEMPLATE_BULK_FORGOT_PASSWORD"),
            book_download: opt_env("MANDRILL_TEMPLATE_BOOK_DOWNLOAD"),
        }
    }
}

/// Service configuration, loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Settings {
    /// HTTP bind port
    pub port: u16,

    /// Postgres connection string for the record store
    pub database_url: String,

    /// Mandrill (Mailchimp Transactional) API key; absent means sends degrade
    pub mandrill_api_key: Option<String>,
    pub mandrill_base_url: String,

    /// Sender address for all outbound email
    pub from_email: String,
    /// Recipient for admin order notifications
    pub admin_email: String,

    /// Base URL of the main application (printer proxy, shipping lookups,
    /// password-reset links)
    pub main_app_url: String,
    /// CDN base for cover/interior artwork PDFs
    pub asset_base_url: String,

    /// Payment provider credentials
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,

    pub templates: TemplateConfig,

    /// Registration safety-net scan: how far back to look for users missing
    /// a welcome email, and how often to scan. Lookback should exceed the
    /// interval so consecutive scans overlap in coverage.
    pub scan_lookback: Duration,
    pub scan_interval: Duration,
}

impl Settings {
    /// Load configuration from environment variables, with defaults suitable
    /// for local development.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3001);

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost:5432/bindery".to_string());

        let scan_lookback_mins = env::var("REGISTRATION_SCAN_LOOKBACK_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10u64);

        let scan_interval_mins = env::var("REGISTRATION_SCAN_INTERVAL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5u64);

        Self {
            port,
            database_url,
            mandrill_api_key: opt_env("MAILCHIMP_TRANSACTIONAL_API_KEY"),
            mandrill_base_url: env::var("MANDRILL_BASE_URL")
                .unwrap_or_else(|_| "https://mandrillapp.com/api/1.0".to_string()),
            from_email: env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "orders@bindery.example".to_string()),
            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@bindery.example".to_string()),
            main_app_url: env::var("MAIN_APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            asset_base_url: env::var("ASSET_BASE_URL")
                .unwrap_or_else(|_| "https://cdn.bindery.example".to_string()),
            stripe_secret_key: opt_env("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: opt_env("STRIPE_WEBHOOK_SECRET"),
            templates: TemplateConfig::from_env(),
            scan_lookback: Duration::from_secs(scan_lookback_mins * 60),
            scan_interval: Duration::from_secs(scan_interval_mins * 60),
        }
    }
}

/// Read an env var, treating empty strings as absent.
fn opt_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
