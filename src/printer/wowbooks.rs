use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::error::{Result, SidecarError};
use crate::models::{OrderInfo, ShippingAddress};
use crate::printer::{build_payload, FileRefs, PrintFulfillmentClient};

// Unresponsive vendor must not hang the webhook request.
const VENDOR_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Wowbooks Client - print vendor proxied through the main application
// ============================================================================

pub struct WowbooksClient {
    http: reqwest::Client,
    base_url: String,
}

impl WowbooksClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(VENDOR_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }

    /// Best-effort shipping-record write after a successful submission.
    /// Failure is logged and swallowed; the print job already exists.
    async fn create_shipping_record(&self, order_id: &str, print_job_id: &str) {
        let url = format!("{}/api/order/orderShipping", self.base_url);
        let body = json!({
            "orderId": order_id,
            "printerOrderId": print_job_id,
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(order_id = %order_id, "Shipping record created");
            }
            Ok(response) => {
                tracing::warn!(
                    order_id = %order_id,
                    status = %response.status(),
                    "Shipping record rejected"
                );
            }
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "Shipping record request failed");
            }
        }
    }
}

#[async_trait]
impl PrintFulfillmentClient for WowbooksClient {
    async fn submit_order(&self, info: &OrderInfo, files: &[FileRefs]) -> Result<String> {
        let print_job_id = format!("PRINTER-{}", Utc::now().timestamp_millis());
        let payload = build_payload(info, files, &print_job_id);

        tracing::info!(
            order_id = %info.order_id,
            print_job_id = %print_job_id,
            items = payload.items.len(),
            "Submitting order to print vendor"
        );

        let url = format!("{}/api/printer/createOrder", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "orderDetails": payload }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SidecarError::Fulfillment("print vendor timed out".to_string())
                } else {
                    SidecarError::Fulfillment(format!("print vendor unreachable: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(SidecarError::Fulfillment(format!(
                "print vendor rejected order: {status}"
            )));
        }

        self.create_shipping_record(&info.order_id, &print_job_id)
            .await;

        tracing::info!(print_job_id = %print_job_id, "Print order created");
        Ok(print_job_id)
    }

    async fn fetch_shipping_address(
        &self,
        print_job_id: &str,
    ) -> Result<Option<ShippingAddress>> {
        let url = format!("{}/api/order/orderShipping", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("printerOrderId", print_job_id)])
            .send()
            .await
            .map_err(|e| SidecarError::Fulfillment(format!("shipping lookup failed: {e}")))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        #[derive(serde::Deserialize)]
        struct ShippingLookup {
            #[serde(rename = "shippingAddress")]
            shipping_address: Option<ShippingAddress>,
        }

        let lookup: ShippingLookup = response
            .json()
            .await
            .map_err(|e| SidecarError::Fulfillment(format!("shipping lookup body: {e}")))?;

        Ok(lookup.shipping_address)
    }
}
