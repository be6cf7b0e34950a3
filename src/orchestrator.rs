use std::sync::Arc;

use chrono::Utc;

use crate::email::{NotificationContent, Notifier};
use crate::error::{Result, SidecarError};
use crate::metrics::Metrics;
use crate::models::{
    Communication, CommunicationMeta, NotificationKind, Order, OrderInfo, OrderStatus,
    StatusHistoryEntry, User,
};
use crate::printer::{FileRefs, PrintFulfillmentClient};
use crate::store::OrderRecordStore;

// ============================================================================
// Fulfillment Orchestrator
// ============================================================================
//
// The pipeline core. Given a payment-succeeded event it assembles the order
// context, notifies admin and customer, submits the print job, and records
// the outcome; given a print-status callback it updates the order, appends
// history, and fires the shipped / book-ready notifications.
//
// Failure isolation: notification and print-vendor failures inside the
// payment-success flow are caught per-step so one downstream hiccup cannot
// prevent the other calls from attempting, and the webhook still returns
// success once the core lookups succeeded (a 5xx here would only trigger an
// upstream redelivery storm).
//
// ============================================================================

pub struct FulfillmentOrchestrator {
    store: Arc<dyn OrderRecordStore>,
    notifier: Arc<Notifier>,
    printer: Arc<dyn PrintFulfillmentClient>,
    metrics: Arc<Metrics>,
    asset_base_url: String,
}

impl FulfillmentOrchestrator {
    pub fn new(
        store: Arc<dyn OrderRecordStore>,
        notifier: Arc<Notifier>,
        printer: Arc<dyn PrintFulfillmentClient>,
        metrics: Arc<Metrics>,
        asset_base_url: String,
    ) -> Self {
        Self {
            store,
            notifier,
            printer,
            metrics,
            asset_base_url,
        }
    }

    /// Handle `payment_intent.succeeded`.
    ///
    /// An unknown payment id is a logged no-op: the payment may belong to a
    /// different subsystem or be a duplicate delivery.
    pub async fn handle_payment_succeeded(&self, payment_intent_id: &str) -> Result<()> {
        tracing::info!(payment_id = %payment_intent_id, "Payment succeeded");

        let Some(payment) = self.store.find_payment(payment_intent_id).await? else {
            tracing::info!(payment_id = %payment_intent_id, "No payment record, nothing to do");
            return Ok(());
        };

        let Some(order_id) = payment.order_id.as_deref() else {
            tracing::info!(payment_id = %payment_intent_id, "Payment has no order reference");
            return Ok(());
        };

        let Some(order) = self.store.find_order_by_id(order_id).await? else {
            tracing::warn!(order_id = %order_id, "Order record missing for paid order");
            return Ok(());
        };

        let user = self.store.find_user_by_id(&order.user_id).await?;
        let mut info = OrderInfo::assemble(&order, user.as_ref(), payment.amount);

        // Optimistic admin notification: the admin hears about the order even
        // if print submission fails after this point.
        if let Err(e) = self
            .notifier
            .send_to_admin(NotificationContent::AdminNewOrder {
                order: info.clone(),
            })
            .await
        {
            tracing::error!(order_id = %info.order_id, error = %e, "Admin notification failed");
        }

        if info.customer_email.is_empty() {
            tracing::warn!(order_id = %info.order_id, "No customer email, skipping confirmation");
        } else if let Err(e) = self
            .notifier
            .send_to(
                &info.customer_email.clone(),
                NotificationContent::OrderReceived {
                    customer_name: info.customer_name.clone(),
                    order_id: info.order_id.clone(),
                    order_date: info.order_date,
                    order_status: order.status.to_string(),
                },
            )
            .await
        {
            tracing::error!(order_id = %info.order_id, error = %e, "Order confirmation failed");
        }

        // Best-effort print submission; a vendor failure never aborts the flow.
        match self.submit_print_job(&info).await {
            Ok(Some(print_job_id)) => {
                self.metrics.record_print_submission(true);
                info.print_job_id = print_job_id.clone();

                // Second admin send now that the job id is known.
                if let Err(e) = self
                    .notifier
                    .send_to_admin(NotificationContent::AdminNewOrder {
                        order: info.clone(),
                    })
                    .await
                {
                    tracing::error!(
                        order_id = %info.order_id,
                        error = %e,
                        "Confirmed admin notification failed"
                    );
                }
            }
            Ok(None) => {
                tracing::warn!(order_id = %info.order_id, "No artwork available for printing");
            }
            Err(e) => {
                self.metrics.record_print_submission(false);
                tracing::error!(order_id = %info.order_id, error = %e, "Print submission failed");
            }
        }

        let mut meta = CommunicationMeta::for_kind(NotificationKind::OrderReceived);
        meta.payment_id = Some(payment_intent_id.to_string());
        meta.print_job_id = Some(info.print_job_id.clone());
        self.store
            .insert_communication(Communication::sent(
                &order.user_id,
                "Order Confirmation",
                "Order confirmation email sent",
                meta,
            ))
            .await?;

        tracing::info!(order_id = %info.order_id, "Order processing completed");
        Ok(())
    }

    /// Handle `payment_intent.payment_failed`: audit record only. No customer
    /// email and no order status transition in the current design.
    pub async fn handle_payment_failed(&self, payment_intent_id: &str) -> Result<()> {
        tracing::info!(payment_id = %payment_intent_id, "Payment failed");

        let Some(payment) = self.store.find_payment(payment_intent_id).await? else {
            return Ok(());
        };
        let Some(order_id) = payment.order_id.as_deref() else {
            return Ok(());
        };
        let Some(order) = self.store.find_order_by_id(order_id).await? else {
            return Ok(());
        };

        let mut meta = CommunicationMeta::for_kind(NotificationKind::PaymentFailed);
        meta.payment_id = Some(payment_intent_id.to_string());
        self.store
            .insert_communication(Communication::sent(
                &order.user_id,
                "Payment Failed",
                "Payment failed notification",
                meta,
            ))
            .await?;

        Ok(())
    }

    /// Handle a print-vendor status callback.
    ///
    /// The status is stored verbatim, trusting the vendor; only "shipped" and
    /// "success" (case-insensitive) trigger notifications. Returns the id of
    /// the resolved order.
    pub async fn handle_print_status(
        &self,
        print_job_id: &str,
        status: &str,
        tracking_url: Option<&str>,
    ) -> Result<String> {
        tracing::info!(
            print_job_id = %print_job_id,
            status = %status,
            tracking_url = ?tracking_url,
            "Print status update received"
        );

        let Some(order) = self.store.find_order_by_print_job_id(print_job_id).await? else {
            tracing::info!(print_job_id = %print_job_id, "No order for print job id");
            return Err(SidecarError::NotFound("order".to_string()));
        };

        let status = OrderStatus::new(status);
        self.store.set_order_status(&order.id, &status).await?;
        self.metrics.record_status_update();

        self.store
            .insert_status_history(StatusHistoryEntry {
                order_id: order.id.clone(),
                status: status.clone(),
                print_job_id: Some(print_job_id.to_string()),
                tracking_url: tracking_url.map(str::to_string),
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(order_id = %order.id, status = %status, "Order status updated");

        // The two notification branches are independent; a failure in one is
        // logged and must not block the other.
        if status.is_shipped() {
            if let Some(tracking_url) = tracking_url {
                if let Err(e) = self
                    .notify_shipped(&order, print_job_id, tracking_url)
                    .await
                {
                    tracing::error!(order_id = %order.id, error = %e, "Shipped notification failed");
                }
            } else {
                tracing::warn!(
                    order_id = %order.id,
                    "Shipped status without tracking URL, skipping notification"
                );
            }
        }

        if status.is_success() {
            if let Err(e) = self.notify_book_ready(&order, print_job_id).await {
                tracing::error!(order_id = %order.id, error = %e, "Book-ready notification failed");
            }
        }

        Ok(order.id)
    }

    /// Build artwork references and submit the print job. Returns the vendor
    /// job id, or `None` when the order has no line items to print.
    async fn submit_print_job(&self, info: &OrderInfo) -> Result<Option<String>> {
        if info.items.is_empty() {
            return Ok(None);
        }

        let files: Vec<FileRefs> = (0..info.items.len())
            .map(|index| FileRefs {
                cover: format!(
                    "{}/covers/{}-{}-cover.pdf",
                    self.asset_base_url, info.order_id, index
                ),
                text: format!(
                    "{}/texts/{}-{}-text.pdf",
                    self.asset_base_url, info.order_id, index
                ),
            })
            .collect();

        let print_job_id = self.printer.submit_order(info, &files).await?;
        self.store
            .append_print_job_id(&info.order_id, &print_job_id)
            .await?;

        Ok(Some(print_job_id))
    }

    async fn notify_shipped(
        &self,
        order: &Order,
        print_job_id: &str,
        tracking_url: &str,
    ) -> Result<()> {
        let user = self.require_user(&order.user_id).await?;

        // Address lookup is best-effort; the notification goes out without
        // one if the order subsystem is unreachable.
        let shipping_address = match self.printer.fetch_shipping_address(print_job_id).await {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(print_job_id = %print_job_id, error = %e, "Shipping address lookup failed");
                None
            }
        };

        self.notifier
            .send_to(
                &user.email,
                NotificationContent::OrderShipped {
                    customer_name: user.display_name().to_string(),
                    order_id: order.id.clone(),
                    tracking_url: tracking_url.to_string(),
                    shipping_address,
                },
            )
            .await?;

        let mut meta = CommunicationMeta::for_kind(NotificationKind::Shipped);
        meta.print_job_id = Some(print_job_id.to_string());
        meta.tracking_url = Some(tracking_url.to_string());
        self.store
            .insert_communication(Communication::sent(
                &order.user_id,
                "Order Shipped",
                &format!("Order shipped notification sent with tracking: {tracking_url}"),
                meta,
            ))
            .await?;

        tracing::info!(order_id = %order.id, "Shipped email sent");
        Ok(())
    }

    async fn notify_book_ready(&self, order: &Order, print_job_id: &str) -> Result<()> {
        let user = self.require_user(&order.user_id).await?;

        let book_title = order
            .items
            .first()
            .and_then(|item| item.book_title.clone())
            .unwrap_or_else(|| "Recipe Book".to_string());

        self.notifier
            .send_to(
                &user.email,
                NotificationContent::BookDownload {
                    customer_name: user.display_name().to_string(),
                    book_title: book_title.clone(),
                },
            )
            .await?;

        let mut meta = CommunicationMeta::for_kind(NotificationKind::BookDownload);
        meta.print_job_id = Some(print_job_id.to_string());
        meta.book_title = Some(book_title.clone());
        self.store
            .insert_communication(Communication::sent(
                &order.user_id,
                "Book Download Ready",
                &format!("Book download notification sent for {book_title}"),
                meta,
            ))
            .await?;

        tracing::info!(order_id = %order.id, "Book download email sent");
        Ok(())
    }

    async fn require_user(&self, user_id: &str) -> Result<User> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| SidecarError::NotFound("user".to_string()))
    }
}
