use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{Result, SidecarError};
use crate::models::{
    Communication, NotificationKind, Order, OrderStatus, Payment, StatusHistoryEntry, User,
};
use crate::store::OrderRecordStore;

// ============================================================================
// In-Memory Record Store
// ============================================================================
//
// Used by the test suite and for credential-free local runs. Mirrors the
// single-document atomicity of the real store: each method takes the lock
// once, so individual operations are atomic but cross-operation sequences
// are not, exactly like the Postgres implementation.
//
// ============================================================================

#[derive(Default)]
struct Records {
    payments: HashMap<String, Payment>,
    orders: HashMap<String, Order>,
    users: HashMap<String, User>,
    communications: Vec<Communication>,
    status_history: Vec<StatusHistoryEntry>,
    reset_tokens: HashMap<String, (String, DateTime<Utc>)>,
}

#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    inner: Arc<RwLock<Records>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_payment(&self, payment: Payment) {
        let mut inner = self.inner.write().await;
        inner
            .payments
            .insert(payment.provider_payment_id.clone(), payment);
    }

    pub async fn insert_order(&self, order: Order) {
        let mut inner = self.inner.write().await;
        inner.orders.insert(order.id.clone(), order);
    }

    pub async fn insert_user(&self, user: User) {
        let mut inner = self.inner.write().await;
        inner.users.insert(user.id.clone(), user);
    }

    /// Snapshot of the communication ledger, in insertion order.
    pub async fn communications(&self) -> Vec<Communication> {
        self.inner.read().await.communications.clone()
    }

    /// Snapshot of the status history, in insertion order.
    pub async fn status_history(&self) -> Vec<StatusHistoryEntry> {
        self.inner.read().await.status_history.clone()
    }

    pub async fn order(&self, order_id: &str) -> Option<Order> {
        self.inner.read().await.orders.get(order_id).cloned()
    }

    pub async fn reset_token(&self, user_id: &str) -> Option<(String, DateTime<Utc>)> {
        self.inner.read().await.reset_tokens.get(user_id).cloned()
    }
}

#[async_trait]
impl OrderRecordStore for InMemoryRecordStore {
    async fn find_payment(&self, provider_payment_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .inner
            .read()
            .await
            .payments
            .get(provider_payment_id)
            .cloned())
    }

    async fn find_order_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(order_id).cloned())
    }

    async fn find_order_by_print_job_id(&self, print_job_id: &str) -> Result<Option<Order>> {
        Ok(self
            .inner
            .read()
            .await
            .orders
            .values()
            .find(|o| o.print_job_ids.iter().any(|id| id == print_job_id))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn users_created_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .filter(|u| u.created_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn has_communication(&self, user_id: &str, kind: NotificationKind) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .await
            .communications
            .iter()
            .any(|c| c.user_id == user_id && c.metadata.kind == kind))
    }

    async fn append_print_job_id(&self, order_id: &str, print_job_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(order_id)
            .ok_or_else(|| SidecarError::NotFound("order".to_string()))?;
        order.print_job_ids.push(print_job_id.to_string());
        Ok(())
    }

    async fn set_order_status(&self, order_id: &str, status: &OrderStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(order_id)
            .ok_or_else(|| SidecarError::NotFound("order".to_string()))?;
        order.status = status.clone();
        Ok(())
    }

    async fn insert_communication(&self, record: Communication) -> Result<()> {
        self.inner.write().await.communications.push(record);
        Ok(())
    }

    async fn insert_status_history(&self, entry: StatusHistoryEntry) -> Result<()> {
        self.inner.write().await.status_history.push(entry);
        Ok(())
    }

    async fn set_password_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner
            .write()
            .await
            .reset_tokens
            .insert(user_id.to_string(), (token_hash.to_string(), expires_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(id: &str, email: &str, created_at: DateTime<Utc>) -> User {
        User {
            id: id.to_string(),
            name: Some("Test".to_string()),
            email: email.to_string(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_find_order_by_print_job_id() {
        let store = InMemoryRecordStore::new();
        store
            .insert_order(Order {
                id: "ORD-1".to_string(),
                user_id: "USR-1".to_string(),
                items: vec![],
                status: OrderStatus::new("PENDING"),
                print_job_ids: vec!["PJ-1".to_string(), "PJ-2".to_string()],
                shipping_address: None,
                created_at: Utc::now(),
            })
            .await;

        let found = store.find_order_by_print_job_id("PJ-2").await.unwrap();
        assert_eq!(found.unwrap().id, "ORD-1");

        let missing = store.find_order_by_print_job_id("PJ-9").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_append_print_job_id_is_monotonic() {
        let store = InMemoryRecordStore::new();
        store
            .insert_order(Order {
                id: "ORD-1".to_string(),
                user_id: "USR-1".to_string(),
                items: vec![],
                status: OrderStatus::new("PENDING"),
                print_job_ids: vec![],
                shipping_address: None,
                created_at: Utc::now(),
            })
            .await;

        store.append_print_job_id("ORD-1", "PJ-1").await.unwrap();
        store.append_print_job_id("ORD-1", "PJ-2").await.unwrap();

        let order = store.order("ORD-1").await.unwrap();
        assert_eq!(order.print_job_ids, vec!["PJ-1", "PJ-2"]);
    }

    #[tokio::test]
    async fn test_has_communication_by_kind() {
        let store = InMemoryRecordStore::new();
        let meta = crate::models::CommunicationMeta::for_kind(NotificationKind::Registration);
        store
            .insert_communication(Communication::sent("USR-1", "Welcome", "sent", meta))
            .await
            .unwrap();

        assert!(store
            .has_communication("USR-1", NotificationKind::Registration)
            .await
            .unwrap());
        assert!(!store
            .has_communication("USR-1", NotificationKind::Shipped)
            .await
            .unwrap());
        assert!(!store
            .has_communication("USR-2", NotificationKind::Registration)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_users_created_since_window() {
        let store = InMemoryRecordStore::new();
        let now = Utc::now();
        store.insert_user(user("new", "new@example.com", now)).await;
        store
            .insert_user(user("old", "old@example.com", now - Duration::hours(2)))
            .await;

        let recent = store
            .users_created_since(now - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "new");
    }
}
