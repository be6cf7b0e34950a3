use chrono::{DateTime, Utc};

use crate::models::{LineItem, NotificationKind, OrderInfo, ShippingAddress};

// ============================================================================
// Notification Content - typed merge data per notification kind
// ============================================================================
//
// Each variant carries the exact fields its notification needs, so a missing
// field is a compile error rather than a blank spot in a sent email. Every
// variant can render both ways: a flat merge-field list for template-driven
// sends and a full HTML body for the raw fallback.
//
// ============================================================================

#[derive(Clone, Debug)]
pub enum NotificationContent {
    AdminNewOrder {
        order: OrderInfo,
    },
    OrderReceived {
        customer_name: String,
        order_id: String,
        order_date: DateTime<Utc>,
        order_status: String,
    },
    OrderShipped {
        customer_name: String,
        order_id: String,
        tracking_url: String,
        shipping_address: Option<ShippingAddress>,
    },
    BookDownload {
        customer_name: String,
        book_title: String,
    },
    Welcome {
        customer_name: String,
    },
    PasswordReset {
        customer_name: String,
        reset_url: String,
    },
}

/// A single template merge field (flat name -> string value).
#[derive(Clone, Debug, serde::Serialize)]
pub struct MergeField {
    pub name: String,
    pub content: String,
}

fn field(name: &str, content: impl Into<String>) -> MergeField {
    MergeField {
        name: name.to_string(),
        content: content.into(),
    }
}

impl NotificationContent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationContent::AdminNewOrder { .. } => NotificationKind::AdminNewOrder,
            NotificationContent::OrderReceived { .. } => NotificationKind::OrderReceived,
            NotificationContent::OrderShipped { .. } => NotificationKind::Shipped,
            NotificationContent::BookDownload { .. } => NotificationKind::BookDownload,
            NotificationContent::Welcome { .. } => NotificationKind::Registration,
            NotificationContent::PasswordReset { .. } => NotificationKind::PasswordReset,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            NotificationContent::AdminNewOrder { order } => {
                format!("New Order Received - Order ID: {}", order.order_id)
            }
            NotificationContent::OrderReceived { .. } => {
                "Your Order Has Been Received".to_string()
            }
            NotificationContent::OrderShipped { .. } => "Your Order Has Shipped".to_string(),
            NotificationContent::BookDownload { .. } => "Book Download Ready".to_string(),
            NotificationContent::Welcome { .. } => "Welcome to The Bindery!".to_string(),
            NotificationContent::PasswordReset { .. } => "Password Reset Request".to_string(),
        }
    }

    /// Flat merge-field mapping passed to template-driven sends.
    pub fn merge_fields(&self) -> Vec<MergeField> {
        match self {
            NotificationContent::AdminNewOrder { order } => vec![
                field("order_id", &order.order_id),
                field("print_job_id", &order.print_job_id),
                field("order_date", order.order_date.to_rfc3339()),
                field("customer_name", &order.customer_name),
                field("customer_email", &order.customer_email),
                field("shipping_address", format_address(&order.shipping_address)),
                field("order_items", summarize_items(&order.items)),
                field("total_value", format_currency(order.total_value)),
            ],
            NotificationContent::OrderReceived {
                customer_name,
                order_id,
                order_date,
                order_status,
            } => vec![
                field("customer_name", customer_name),
                field("order_id", order_id),
                field("order_date", order_date.to_rfc3339()),
                field("order_status", order_status),
            ],
            NotificationContent::OrderShipped {
                customer_name,
                order_id,
                tracking_url,
                shipping_address,
            } => {
                let mut fields = vec![
                    field("customer_name", customer_name),
                    field("order_id", order_id),
                    field("tracking_url", tracking_url),
                ];
                if let Some(address) = shipping_address {
                    fields.push(field("shipping_address", format_address(address)));
                }
                fields
            }
            NotificationContent::BookDownload {
                customer_name,
                book_title,
            } => vec![
                field("customer_name", customer_name),
                field("book_title", book_title),
            ],
            NotificationContent::Welcome { customer_name } => {
                vec![field("customer_name", customer_name)]
            }
            NotificationContent::PasswordReset {
                customer_name,
                reset_url,
            } => vec![
                field("customer_name", customer_name),
                field("reset_url", reset_url),
            ],
        }
    }

    /// Raw HTML body used when no template is configured for this kind.
    pub fn html(&self) -> String {
        match self {
            NotificationContent::AdminNewOrder { order } => admin_new_order_html(order),
            NotificationContent::OrderReceived {
                customer_name,
                order_id,
                order_date,
                order_status,
            } => format!(
                "<h1>Order Confirmation</h1>\
                 <p>Dear {customer_name},</p>\
                 <p>Thank you for your order! We've received your order and will process it shortly.</p>\
                 <h2>Order Details:</h2>\
                 <p><strong>Order ID:</strong> {order_id}</p>\
                 <p><strong>Order Date:</strong> {order_date}</p>\
                 <p><strong>Status:</strong> {order_status}</p>\
                 <p>We'll send you another email when your order ships.</p>\
                 <p>Best regards,<br>The Bindery Team</p>"
            ),
            NotificationContent::OrderShipped {
                customer_name,
                order_id,
                tracking_url,
                ..
            } => format!(
                "<h1>Your Order Has Shipped!</h1>\
                 <p>Dear {customer_name},</p>\
                 <p>Great news! Your order has been shipped and is on its way to you.</p>\
                 <h2>Order Details:</h2>\
                 <p><strong>Order ID:</strong> {order_id}</p>\
                 <p><strong>Tracking:</strong> <a href=\"{tracking_url}\">Track Your Package</a></p>\
                 <p>Thank you for choosing The Bindery!</p>\
                 <p>Best regards,<br>The Bindery Team</p>"
            ),
            NotificationContent::BookDownload {
                customer_name,
                book_title,
            } => format!(
                "<h1>Your Book Is Ready!</h1>\
                 <p>Dear {customer_name},</p>\
                 <p>Your book <strong>{book_title}</strong> has finished printing and your \
                 digital copy is ready to download from your account.</p>\
                 <p>Best regards,<br>The Bindery Team</p>"
            ),
            NotificationContent::Welcome { customer_name } => format!(
                "<h1>Welcome to The Bindery!</h1>\
                 <p>Dear {customer_name},</p>\
                 <p>Thanks for creating an account. We can't wait to print your first book.</p>\
                 <p>Best regards,<br>The Bindery Team</p>"
            ),
            NotificationContent::PasswordReset {
                customer_name,
                reset_url,
            } => format!(
                "<h1>Password Reset Request</h1>\
                 <p>Dear {customer_name},</p>\
                 <p>You requested a password reset for your Bindery account.</p>\
                 <p><a href=\"{reset_url}\">Reset Your Password</a></p>\
                 <p>This link will expire in 1 hour.</p>\
                 <p>If you didn't request this, please ignore this email.</p>\
                 <p>Best regards,<br>The Bindery Team</p>"
            ),
        }
    }
}

/// Render a monetary value the way the storefront shows it, e.g. "£25.99".
pub fn format_currency(value: f64) -> String {
    format!("£{value:.2}")
}

/// One-line summary of the ordered items, e.g. "Test Recipe Book x1".
fn summarize_items(items: &[LineItem]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "{} x{}",
                item.book_title.as_deref().unwrap_or("Custom Book"),
                item.quantity.unwrap_or(1)
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_address(address: &ShippingAddress) -> String {
    let mut lines = vec![
        format!("{} {}", address.first_name, address.last_name),
        address.address_line1.clone(),
    ];
    if let Some(line2) = &address.address_line2 {
        if !line2.is_empty() {
            lines.push(line2.clone());
        }
    }
    lines.push(format!("{}, {}", address.town, address.county));
    lines.push(format!("{}, {}", address.post_code, address.country));
    lines.join(", ")
}

fn admin_new_order_html(order: &OrderInfo) -> String {
    let items_html = order
        .items
        .iter()
        .map(|item| {
            format!(
                "<li><strong>{}</strong><br>Type: {} ({})<br>Quantity: {}<br>Value: {}</li>",
                item.book_title.as_deref().unwrap_or("Custom Book"),
                item.product_type.as_deref().unwrap_or("Hardcover"),
                item.product_code.as_deref().unwrap_or("CUSTOM-001"),
                item.quantity.unwrap_or(1),
                format_currency(item.value.unwrap_or(0.0)),
            )
        })
        .collect::<String>();

    let address = &order.shipping_address;
    let line2 = address
        .address_line2
        .as_deref()
        .filter(|l| !l.is_empty())
        .map(|l| format!("<p>{l}</p>"))
        .unwrap_or_default();

    format!(
        "<h1>New Order Received</h1>\
         <h2>Order Details:</h2>\
         <p><strong>Order ID:</strong> {}</p>\
         <p><strong>Print Job ID:</strong> {}</p>\
         <p><strong>Order Date:</strong> {}</p>\
         <h2>Customer Information:</h2>\
         <p><strong>Name:</strong> {}</p>\
         <p><strong>Email:</strong> {}</p>\
         <h2>Shipping Address:</h2>\
         <p>{} {}</p>\
         <p>{}</p>\
         {}\
         <p>{}, {}</p>\
         <p>{}, {}</p>\
         <h2>Order Items:</h2>\
         <ul>{}</ul>\
         <h2>Order Summary:</h2>\
         <p><strong>Total Value:</strong> {}</p>",
        order.order_id,
        order.print_job_id,
        order.order_date.to_rfc3339(),
        order.customer_name,
        order.customer_email,
        address.first_name,
        address.last_name,
        address.address_line1,
        line2,
        address.town,
        address.county,
        address.post_code,
        address.country,
        items_html,
        format_currency(order.total_value),
    )
}
