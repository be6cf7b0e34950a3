use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod email;
mod error;
mod metrics;
mod models;
mod orchestrator;
mod printer;
mod registration;
mod store;
mod webhooks;

use email::{MandrillGateway, Notifier};
use orchestrator::FulfillmentOrchestrator;
use printer::WowbooksClient;
use registration::RegistrationNotifier;
use store::{OrderRecordStore, PgRecordStore};
use webhooks::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bindery_sidecar=debug")),
        )
        .init();

    let settings = config::Settings::from_env();
    tracing::info!(port = settings.port, "Starting notification sidecar");

    // === 1. Record store ===
    tracing::info!("Connecting to Postgres...");
    let pg = PgRecordStore::connect(&settings.database_url).await?;
    pg.ensure_schema().await?;
    let store: Arc<dyn OrderRecordStore> = Arc::new(pg);

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);

    // === 3. Outbound email ===
    let gateway = Arc::new(MandrillGateway::new(
        settings.mandrill_api_key.clone(),
        settings.mandrill_base_url.clone(),
    ));
    let notifier = Arc::new(Notifier::new(
        gateway,
        settings.from_email.clone(),
        settings.admin_email.clone(),
        settings.templates.clone(),
        metrics.clone(),
    ));

    // === 4. Print vendor client ===
    let printer = Arc::new(WowbooksClient::new(settings.main_app_url.clone()));

    // === 5. Fulfillment pipeline ===
    let orchestrator = Arc::new(FulfillmentOrchestrator::new(
        store.clone(),
        notifier.clone(),
        printer,
        metrics.clone(),
        settings.asset_base_url.clone(),
    ));

    // === 6. Registration safety net ===
    let registration = Arc::new(RegistrationNotifier::new(
        store.clone(),
        notifier.clone(),
        metrics.clone(),
        settings.scan_lookback,
    ));
    registration.clone().spawn_monitor(settings.scan_interval);

    // === 7. HTTP server ===
    let port = settings.port;
    let state = web::Data::new(AppState {
        orchestrator,
        registration,
        store,
        notifier,
        metrics,
        settings,
    });

    tracing::info!(port, "Listening for webhooks");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(webhooks::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
