mod memory;
mod postgres;

pub use memory::InMemoryRecordStore;
pub use postgres::PgRecordStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Communication, NotificationKind, Order, OrderStatus, Payment, StatusHistoryEntry, User,
};

// ============================================================================
// Order Record Store - capability interface
// ============================================================================
//
// All writes are single-document operations; no multi-document transaction
// is required because each write is independently idempotent-safe: print-job
// ids and audit records are append-only, and status set is last-write-wins
// with the history table preserving every transition regardless.
//
// ============================================================================

#[async_trait]
pub trait OrderRecordStore: Send + Sync {
    async fn find_payment(&self, provider_payment_id: &str) -> Result<Option<Payment>>;

    async fn find_order_by_id(&self, order_id: &str) -> Result<Option<Order>>;

    /// Resolve an order by scanning its print-job-id collection for a match.
    async fn find_order_by_print_job_id(&self, print_job_id: &str) -> Result<Option<Order>>;

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Users created at or after the cutoff, used by the registration scan.
    async fn users_created_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>>;

    /// Point lookup used as the idempotency check before any send-once
    /// notification.
    async fn has_communication(&self, user_id: &str, kind: NotificationKind) -> Result<bool>;

    async fn append_print_job_id(&self, order_id: &str, print_job_id: &str) -> Result<()>;

    async fn set_order_status(&self, order_id: &str, status: &OrderStatus) -> Result<()>;

    async fn insert_communication(&self, record: Communication) -> Result<()>;

    async fn insert_status_history(&self, entry: StatusHistoryEntry) -> Result<()>;

    /// Persist a hashed password-reset token with its expiry on the user.
    async fn set_password_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
}
