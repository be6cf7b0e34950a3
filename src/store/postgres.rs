use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Communication, LineItem, NotificationKind, Order, OrderStatus, Payment, ShippingAddress,
    StatusHistoryEntry, User,
};
use crate::store::OrderRecordStore;

// ============================================================================
// Postgres Record Store
// ============================================================================
//
// Order / User line items, addresses, and communication metadata live in
// JSONB columns; the print-job-id collection is a text[] appended with
// array_append so ids are never rewritten. Every operation here is a single
// statement, which is all the atomicity the pipeline relies on.
//
// ============================================================================

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    ///
    /// The partial unique index on registration communications backstops the
    /// check-then-send idempotency sequence at the store level.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT,
                email TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                reset_token TEXT,
                reset_token_expiry TIMESTAMPTZ
            )",
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                items JSONB NOT NULL DEFAULT '[]'::jsonb,
                status TEXT NOT NULL DEFAULT 'PENDING',
                print_job_ids TEXT[] NOT NULL DEFAULT '{}',
                shipping_address JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS payments (
                provider_payment_id TEXT PRIMARY KEY,
                order_id TEXT,
                amount DOUBLE PRECISION NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS communications (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                subject TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL,
                metadata JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS order_status_history (
                id BIGSERIAL PRIMARY KEY,
                order_id TEXT NOT NULL,
                status TEXT NOT NULL,
                print_job_id TEXT,
                tracking_url TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS communications_user_kind
                ON communications (user_id, (metadata->>'kind'))",
            "CREATE UNIQUE INDEX IF NOT EXISTS communications_registration_once
                ON communications (user_id)
                WHERE metadata->>'kind' = 'registration'",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Record store schema ensured");
        Ok(())
    }

    fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<Order> {
        let items: Json<Vec<LineItem>> = row.try_get("items")?;
        let shipping_address: Option<Json<ShippingAddress>> = row.try_get("shipping_address")?;
        Ok(Order {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            items: items.0,
            status: OrderStatus::new(row.try_get::<String, _>("status")?),
            print_job_ids: row.try_get("print_job_ids")?,
            shipping_address: shipping_address.map(|j| j.0),
            created_at: row.try_get("created_at")?,
        })
    }

    fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User> {
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OrderRecordStore for PgRecordStore {
    async fn find_payment(&self, provider_payment_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(
            "SELECT provider_payment_id, order_id, amount FROM payments
             WHERE provider_payment_id = $1",
        )
        .bind(provider_payment_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Payment {
                provider_payment_id: row.try_get("provider_payment_id")?,
                order_id: row.try_get("order_id")?,
                amount: row.try_get("amount")?,
            })),
            None => Ok(None),
        }
    }

    async fn find_order_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, user_id, items, status, print_job_ids, shipping_address, created_at
             FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::order_from_row).transpose()
    }

    async fn find_order_by_print_job_id(&self, print_job_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, user_id, items, status, print_job_ids, shipping_address, created_at
             FROM orders WHERE $1 = ANY(print_job_ids)",
        )
        .bind(print_job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::order_from_row).transpose()
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, created_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, created_at FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::user_from_row).transpose()
    }

    async fn users_created_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, name, email, created_at FROM users WHERE created_at >= $1
             ORDER BY created_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::user_from_row).collect()
    }

    async fn has_communication(&self, user_id: &str, kind: NotificationKind) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS one FROM communications
             WHERE user_id = $1 AND metadata->>'kind' = $2 LIMIT 1",
        )
        .bind(user_id)
        .bind(kind.tag())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn append_print_job_id(&self, order_id: &str, print_job_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE orders SET print_job_ids = array_append(print_job_ids, $2) WHERE id = $1",
        )
        .bind(order_id)
        .bind(print_job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_order_status(&self, order_id: &str, status: &OrderStatus) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_communication(&self, record: Communication) -> Result<()> {
        sqlx::query(
            "INSERT INTO communications
                (id, user_id, channel, subject, content, status, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::new_v4())
        .bind(&record.user_id)
        .bind(&record.channel)
        .bind(&record.subject)
        .bind(&record.content)
        .bind(&record.status)
        .bind(Json(&record.metadata))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_status_history(&self, entry: StatusHistoryEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO order_status_history
                (order_id, status, print_job_id, tracking_url, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&entry.order_id)
        .bind(entry.status.as_str())
        .bind(&entry.print_job_id)
        .bind(&entry.tracking_url)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_password_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET reset_token = $2, reset_token_expiry = $3 WHERE id = $1")
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
