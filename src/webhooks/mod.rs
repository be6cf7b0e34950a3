mod stripe;

pub use stripe::{construct_event, StripeEvent};

use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use prometheus::{Encoder, TextEncoder};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::email::{NotificationContent, Notifier};
use crate::error::{Result, SidecarError};
use crate::metrics::Metrics;
use crate::orchestrator::FulfillmentOrchestrator;
use crate::registration::{RegistrationNotifier, RegistrationTrigger, WelcomeOutcome};
use crate::store::OrderRecordStore;

// ============================================================================
// HTTP Surface - thin triggers into the pipeline core
// ============================================================================

pub struct AppState {
    pub orchestrator: Arc<FulfillmentOrchestrator>,
    pub registration: Arc<RegistrationNotifier>,
    pub store: Arc<dyn OrderRecordStore>,
    pub notifier: Arc<Notifier>,
    pub metrics: Arc<Metrics>,
    pub settings: Settings,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler))
        .service(
            web::scope("/api")
                .route("/stripe-webhook", web::post().to(stripe_webhook))
                .route("/stripe-webhook-with-printer", web::post().to(stripe_webhook))
                .route("/printer-status-webhook", web::post().to(printer_status_webhook))
                .route("/order-status-webhook", web::post().to(order_status_webhook))
                .route("/password-reset", web::post().to(password_reset))
                .route("/user-registration", web::post().to(user_registration))
                .route(
                    "/user-registration-webhook",
                    web::post().to(user_registration_webhook),
                )
                .route("/cron-check-new-users", web::get().to(cron_check_new_users)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "service": "bindery-sidecar",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler(state: web::Data<AppState>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

// ============================================================================
// Payment webhook
// ============================================================================

async fn stripe_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let secret = state.settings.stripe_webhook_secret.as_deref().ok_or_else(|| {
        SidecarError::Configuration("STRIPE_WEBHOOK_SECRET is not set".to_string())
    })?;

    let signature = req
        .headers()
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SidecarError::Signature("missing Stripe-Signature header".to_string()))?;

    // Rejection happens before any side effect
    let event = construct_event(&body, signature, secret)?;
    state.metrics.record_webhook_event(&event.event_type);

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            state
                .orchestrator
                .handle_payment_succeeded(&event.data.object.id)
                .await?;
        }
        "payment_intent.payment_failed" => {
            state
                .orchestrator
                .handle_payment_failed(&event.data.object.id)
                .await?;
        }
        other => {
            tracing::debug!(event_type = %other, "Unhandled event type");
        }
    }

    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}

// ============================================================================
// Print-status webhooks
// ============================================================================

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PrintStatusRequest {
    /// The vendor's print-job identifier (named orderId on their side)
    order_id: String,
    status: String,
    tracking_url: Option<String>,
}

impl PrintStatusRequest {
    fn validate(&self) -> Result<()> {
        if self.order_id.is_empty() {
            return Err(SidecarError::Validation("orderId is required".to_string()));
        }
        if self.status.is_empty() {
            return Err(SidecarError::Validation("status is required".to_string()));
        }
        Ok(())
    }
}

async fn printer_status_webhook(
    state: web::Data<AppState>,
    body: web::Json<PrintStatusRequest>,
) -> Result<HttpResponse> {
    body.validate()?;
    state.metrics.record_webhook_event("printer_status");

    let order_id = state
        .orchestrator
        .handle_print_status(&body.order_id, &body.status, body.tracking_url.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "orderId": order_id,
        "message": "Status updated successfully",
    })))
}

async fn order_status_webhook(
    state: web::Data<AppState>,
    body: web::Json<PrintStatusRequest>,
) -> Result<HttpResponse> {
    body.validate()?;
    state.metrics.record_webhook_event("order_status");

    state
        .orchestrator
        .handle_print_status(&body.order_id, &body.status, body.tracking_url.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

// ============================================================================
// Password reset
// ============================================================================

#[derive(Deserialize, Debug)]
struct PasswordResetRequest {
    email: Option<String>,
}

async fn password_reset(
    state: web::Data<AppState>,
    body: web::Json<PasswordResetRequest>,
) -> Result<HttpResponse> {
    let email = body
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| SidecarError::Validation("Email is required".to_string()))?;

    let user = state
        .store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| SidecarError::NotFound("user".to_string()))?;

    let mut token_bytes = [0u8; 20];
    rand::thread_rng().fill(&mut token_bytes[..]);
    let reset_token = hex::encode(token_bytes);
    // Only the hash is persisted; the raw token lives in the emailed link
    let token_hash = hex::encode(Sha256::digest(reset_token.as_bytes()));

    state
        .store
        .set_password_reset_token(&user.id, &token_hash, Utc::now() + Duration::hours(1))
        .await?;

    let reset_url = format!("{}/reset-password/{}", state.settings.main_app_url, reset_token);
    state
        .notifier
        .send_to(
            &user.email,
            NotificationContent::PasswordReset {
                customer_name: user.display_name().to_string(),
                reset_url,
            },
        )
        .await?;

    let meta = crate::models::CommunicationMeta::for_kind(
        crate::models::NotificationKind::PasswordReset,
    );
    state
        .store
        .insert_communication(crate::models::Communication::sent(
            &user.id,
            "Password Reset Request",
            "Password reset email sent",
            meta,
        ))
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Password reset email sent" })))
}

// ============================================================================
// Registration triggers
// ============================================================================

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RegistrationRequest {
    user_id: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

async fn user_registration(
    state: web::Data<AppState>,
    body: web::Json<RegistrationRequest>,
) -> Result<HttpResponse> {
    let email = body
        .email
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SidecarError::Validation("Email and name are required".to_string()))?;
    let name = body
        .name
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SidecarError::Validation("Email and name are required".to_string()))?;

    let mut user = state
        .store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| SidecarError::NotFound("user".to_string()))?;
    // Caller-supplied name wins over the stored record, as upstream does
    user.name = Some(name.to_string());

    let outcome = state
        .registration
        .notify_new_user(&user, RegistrationTrigger::Direct)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": match outcome {
            WelcomeOutcome::Sent => "Welcome email sent successfully",
            WelcomeOutcome::AlreadySent => "Welcome email already sent",
        },
        "user": { "id": user.id, "name": user.name, "email": user.email },
    })))
}

async fn user_registration_webhook(
    state: web::Data<AppState>,
    body: web::Json<RegistrationRequest>,
) -> Result<HttpResponse> {
    let user_id = body
        .user_id
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SidecarError::Validation("userId and email are required".to_string()))?;
    let email = body
        .email
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SidecarError::Validation("userId and email are required".to_string()))?;

    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .filter(|u| u.email == email)
        .ok_or_else(|| SidecarError::NotFound("user".to_string()))?;

    let outcome = state
        .registration
        .notify_new_user(&user, RegistrationTrigger::Webhook)
        .await?;

    if outcome == WelcomeOutcome::AlreadySent {
        return Ok(HttpResponse::Ok().json(json!({
            "message": "Welcome email already sent",
            "alreadySent": true,
        })));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Welcome email sent successfully",
        "user": { "id": user.id, "name": user.name, "email": user.email },
    })))
}

async fn cron_check_new_users(state: web::Data<AppState>) -> Result<HttpResponse> {
    let report = state.registration.scan_recent_users().await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "User registration check completed",
        "newUsersFound": report.new_users_found,
        "emailsSent": report.emails_sent,
        "errors": report.errors,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateConfig;
    use crate::email::testing::RecordingGateway;
    use crate::error::Result;
    use crate::models::{LineItem, Order, OrderInfo, OrderStatus, ShippingAddress, User};
    use crate::printer::{FileRefs, PrintFulfillmentClient};
    use crate::store::InMemoryRecordStore;
    use actix_web::{test, App};
    use async_trait::async_trait;

    struct StubPrinter;

    #[async_trait]
    impl PrintFulfillmentClient for StubPrinter {
        async fn submit_order(&self, _info: &OrderInfo, _files: &[FileRefs]) -> Result<String> {
            Ok("PRINTER-1".to_string())
        }

        async fn fetch_shipping_address(
            &self,
            _print_job_id: &str,
        ) -> Result<Option<ShippingAddress>> {
            Ok(None)
        }
    }

    struct TestContext {
        store: InMemoryRecordStore,
        gateway: Arc<RecordingGateway>,
        state: web::Data<AppState>,
    }

    fn test_context() -> TestContext {
        let store = InMemoryRecordStore::new();
        let gateway = Arc::new(RecordingGateway::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let notifier = Arc::new(Notifier::new(
            gateway.clone(),
            "orders@bindery.example".to_string(),
            "admin@bindery.example".to_string(),
            TemplateConfig::default(),
            metrics.clone(),
        ));
        let store_arc: Arc<dyn OrderRecordStore> = Arc::new(store.clone());
        let orchestrator = Arc::new(FulfillmentOrchestrator::new(
            store_arc.clone(),
            notifier.clone(),
            Arc::new(StubPrinter),
            metrics.clone(),
            "https://cdn.bindery.example".to_string(),
        ));
        let registration = Arc::new(RegistrationNotifier::new(
            store_arc.clone(),
            notifier.clone(),
            metrics.clone(),
            std::time::Duration::from_secs(600),
        ));
        let mut settings = Settings::from_env();
        settings.stripe_webhook_secret = Some("whsec_test".to_string());

        let state = web::Data::new(AppState {
            orchestrator,
            registration,
            store: store_arc,
            notifier,
            metrics,
            settings,
        });
        TestContext {
            store,
            gateway,
            state,
        }
    }

    async fn seed_order(store: &InMemoryRecordStore) {
        store
            .insert_order(Order {
                id: "ORD-1".to_string(),
                user_id: "USR-1".to_string(),
                items: vec![LineItem {
                    book_title: Some("Test Recipe Book".to_string()),
                    product_type: Some("Hardcover".to_string()),
                    product_code: None,
                    job_reference: None,
                    quantity: Some(1),
                    page_count: None,
                    value: Some(25.99),
                }],
                status: OrderStatus::new("PROCESSING"),
                print_job_ids: vec!["PJ-1".to_string()],
                shipping_address: None,
                created_at: Utc::now(),
            })
            .await;
        store
            .insert_user(User {
                id: "USR-1".to_string(),
                name: Some("Ada".to_string()),
                email: "ada@example.com".to_string(),
                created_at: Utc::now(),
            })
            .await;
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let ctx = test_context();
        let app =
            test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request())
            .await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "OK");
    }

    #[actix_web::test]
    async fn test_printer_status_webhook_unknown_job_is_404() {
        let ctx = test_context();
        let app =
            test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/printer-status-webhook")
            .set_json(json!({ "orderId": "PJ-404", "status": "shipped" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_printer_status_webhook_happy_path() {
        let ctx = test_context();
        seed_order(&ctx.store).await;
        let app =
            test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/printer-status-webhook")
            .set_json(json!({
                "orderId": "PJ-1",
                "status": "shipped",
                "trackingUrl": "https://t/1",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["orderId"], "ORD-1");

        assert_eq!(ctx.gateway.sent_count().await, 1);
    }

    #[actix_web::test]
    async fn test_stripe_webhook_rejects_bad_signature() {
        let ctx = test_context();
        let app =
            test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/stripe-webhook")
            .insert_header(("stripe-signature", "t=1,v1=deadbeef"))
            .set_payload(r#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        // Zero side effects on rejection
        assert_eq!(ctx.gateway.sent_count().await, 0);
        assert!(ctx.store.communications().await.is_empty());
    }

    #[actix_web::test]
    async fn test_user_registration_requires_email_and_name() {
        let ctx = test_context();
        let app =
            test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/user-registration")
            .set_json(json!({ "email": "ada@example.com" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_user_registration_webhook_dedups() {
        let ctx = test_context();
        seed_order(&ctx.store).await;
        let app =
            test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

        let payload = json!({ "userId": "USR-1", "email": "ada@example.com", "name": "Ada" });

        let first = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/user-registration-webhook")
                .set_json(payload.clone())
                .to_request(),
        )
        .await;
        assert!(first.status().is_success());

        let second = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/user-registration-webhook")
                .set_json(payload)
                .to_request(),
        )
        .await;
        let body: serde_json::Value = test::read_body_json(second).await;
        assert_eq!(body["alreadySent"], true);

        assert_eq!(ctx.gateway.sent_count().await, 1);
    }

    #[actix_web::test]
    async fn test_cron_endpoint_reports_counts() {
        let ctx = test_context();
        seed_order(&ctx.store).await;
        let app =
            test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/cron-check-new-users")
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["newUsersFound"], 1);
        assert_eq!(body["emailsSent"], 1);
        assert_eq!(body["errors"], 0);
    }

    #[actix_web::test]
    async fn test_password_reset_unknown_user_is_404() {
        let ctx = test_context();
        let app =
            test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/password-reset")
            .set_json(json!({ "email": "nobody@example.com" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_password_reset_stores_hashed_token() {
        let ctx = test_context();
        seed_order(&ctx.store).await;
        let app =
            test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/password-reset")
            .set_json(json!({ "email": "ada@example.com" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let (token_hash, expires_at) = ctx.store.reset_token("USR-1").await.unwrap();
        // SHA-256 hex digest, not the raw token
        assert_eq!(token_hash.len(), 64);
        assert!(expires_at > Utc::now());

        assert_eq!(ctx.gateway.sent_count().await, 1);
        let comms = ctx.store.communications().await;
        assert_eq!(comms.len(), 1);
        assert_eq!(
            comms[0].metadata.kind,
            crate::models::NotificationKind::PasswordReset
        );
    }
}
