use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Domain Models
// ============================================================================
//
// Order and User are owned by the upstream order-management / identity
// subsystems; this sidecar only updates order status and appends print-job
// ids. Communication and OrderStatusHistory are owned here and are
// append-only: they form the durable idempotency ledger and audit trail.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Display name with the upstream fallback for accounts created
    /// without one.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Customer")
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub town: String,
    pub county: String,
    pub post_code: String,
    pub country: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LineItem {
    pub book_title: Option<String>,
    /// Product type, e.g. "Hardcover"
    pub product_type: Option<String>,
    pub product_code: Option<String>,
    pub job_reference: Option<String>,
    pub quantity: Option<i32>,
    pub page_count: Option<i32>,
    pub value: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub items: Vec<LineItem>,
    pub status: OrderStatus,
    /// Vendor-assigned print-job ids, appended in submission order and
    /// never removed.
    pub print_job_ids: Vec<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
}

/// Payment record written by the checkout subsystem, keyed by the payment
/// provider's intent id.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Payment {
    pub provider_payment_id: String,
    pub order_id: Option<String>,
    pub amount: f64,
}

// ============================================================================
// Order Status - open string newtype
// ============================================================================
//
// The print vendor may send statuses we do not recognize; those are stored
// verbatim. Only "shipped" and "success" (case-insensitive) drive behavior.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct OrderStatus(pub String);

impl OrderStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_shipped(&self) -> bool {
        self.0.eq_ignore_ascii_case("shipped")
    }

    pub fn is_success(&self) -> bool {
        self.0.eq_ignore_ascii_case("success")
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Notification Kinds
// ============================================================================

/// Tag recorded in Communication metadata and used for idempotency lookups.
/// Serialized form matches the upstream audit-log strings.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    #[serde(rename = "registration")]
    Registration,
    #[serde(rename = "orderReceived")]
    OrderReceived,
    #[serde(rename = "shipped")]
    Shipped,
    #[serde(rename = "book_download")]
    BookDownload,
    #[serde(rename = "passwordReset")]
    PasswordReset,
    #[serde(rename = "paymentFailed")]
    PaymentFailed,
    #[serde(rename = "adminNewOrder")]
    AdminNewOrder,
}

impl NotificationKind {
    /// Ledger tag, kept byte-compatible with the upstream audit log.
    pub fn tag(&self) -> &'static str {
        match self {
            NotificationKind::Registration => "registration",
            NotificationKind::OrderReceived => "orderReceived",
            NotificationKind::Shipped => "shipped",
            NotificationKind::BookDownload => "book_download",
            NotificationKind::PasswordReset => "passwordReset",
            NotificationKind::PaymentFailed => "paymentFailed",
            NotificationKind::AdminNewOrder => "adminNewOrder",
        }
    }
}

// ============================================================================
// Audit Records (owned by this sidecar, append-only)
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Communication {
    pub user_id: String,
    /// Fixed channel in the current design.
    pub channel: String,
    pub subject: String,
    pub content: String,
    pub status: String,
    pub metadata: CommunicationMeta,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CommunicationMeta {
    pub kind: NotificationKind,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
}

impl CommunicationMeta {
    pub fn for_kind(kind: NotificationKind) -> Self {
        Self {
            kind,
            provider: "mandrill".to_string(),
            payment_id: None,
            print_job_id: None,
            tracking_url: None,
            book_title: None,
            triggered_by: None,
        }
    }
}

impl Communication {
    pub fn sent(user_id: &str, subject: &str, content: &str, metadata: CommunicationMeta) -> Self {
        Self {
            user_id: user_id.to_string(),
            channel: "EMAIL".to_string(),
            subject: subject.to_string(),
            content: content.to_string(),
            status: "SENT".to_string(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StatusHistoryEntry {
    pub order_id: String,
    pub status: OrderStatus,
    pub print_job_id: Option<String>,
    pub tracking_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Order-Info Context
// ============================================================================
//
// Assembled read model passed into notification and print calls. Built once
// per payment-succeeded event; the print-job id starts as "pending" and is
// replaced after a successful vendor submission.
//
// ============================================================================

#[derive(Serialize, Clone, Debug)]
pub struct OrderInfo {
    pub order_id: String,
    pub print_job_id: String,
    pub order_date: DateTime<Utc>,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: ShippingAddress,
    pub items: Vec<LineItem>,
    pub total_value: f64,
}

impl OrderInfo {
    /// Assemble the context from the loaded records. Missing upstream data
    /// falls back to placeholders rather than aborting the flow.
    pub fn assemble(order: &Order, user: Option<&User>, amount: f64) -> Self {
        let customer_name = user
            .map(|u| u.display_name().to_string())
            .unwrap_or_else(|| "Customer".to_string());
        let customer_email = user.map(|u| u.email.clone()).unwrap_or_default();

        let shipping_address = order.shipping_address.clone().unwrap_or(ShippingAddress {
            first_name: "Customer".to_string(),
            last_name: customer_name.clone(),
            address_line1: "Address".to_string(),
            address_line2: None,
            town: "City".to_string(),
            county: "County".to_string(),
            post_code: "Postcode".to_string(),
            country: "Country".to_string(),
        });

        Self {
            order_id: order.id.clone(),
            print_job_id: order
                .print_job_ids
                .first()
                .cloned()
                .unwrap_or_else(|| "pending".to_string()),
            order_date: order.created_at,
            customer_name,
            customer_email,
            shipping_address,
            items: order.items.clone(),
            total_value: amount,
        }
    }
}
