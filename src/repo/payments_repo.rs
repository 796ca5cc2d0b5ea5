use crate::domain::payment::{NewPaymentLogEntry, Payment, PaymentLogEntry, PaymentStatus};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const ONE_OPEN_PER_ORDER: &str = "payments_one_open_per_order";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another open payment for the same order was stored first.
    OpenPaymentExists,
}

/// Storage for payments and their audit trail. No business rules live here.
#[async_trait::async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Never stores a second open payment for one order.
    async fn insert_payment(&self, payment: &Payment) -> Result<InsertOutcome>;

    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<Payment>>;

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Payment>>;

    async fn find_open_for_order(&self, order_id: Uuid) -> Result<Option<Payment>>;

    /// Compare-and-set on `payment.version`. Returns the stored row with the
    /// bumped version, or `None` when someone else updated it first.
    async fn update_payment(&self, payment: &Payment) -> Result<Option<Payment>>;

    async fn append_log(&self, entry: &NewPaymentLogEntry) -> Result<PaymentLogEntry>;

    async fn list_logs(&self, payment_id: Uuid) -> Result<Vec<PaymentLogEntry>>;

    async fn list_stale_open(&self, updated_before: DateTime<Utc>, limit: i64) -> Result<Vec<Payment>>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

const PAYMENT_COLUMNS: &str = "payment_id, order_id, gateway_order_id, gateway_payment_id, amount, currency, description, status, refunded_amount, refund_status, checkout_url, failure_reason, completed_at, metadata, version, created_at, updated_at";

fn parse_status(raw: &str) -> Result<PaymentStatus> {
    PaymentStatus::parse(raw).ok_or_else(|| anyhow!("unknown payment status {raw:?} in storage"))
}

fn payment_from_row(r: &PgRow) -> Result<Payment> {
    let status: String = r.try_get("status")?;
    Ok(Payment {
        id: r.try_get("payment_id")?,
        order_id: r.try_get("order_id")?,
        gateway_order_id: r.try_get("gateway_order_id")?,
        gateway_payment_id: r.try_get("gateway_payment_id")?,
        amount: r.try_get("amount")?,
        currency: r.try_get("currency")?,
        description: r.try_get("description")?,
        status: parse_status(&status)?,
        refunded_amount: r.try_get("refunded_amount")?,
        refund_status: r.try_get("refund_status")?,
        checkout_url: r.try_get("checkout_url")?,
        failure_reason: r.try_get("failure_reason")?,
        completed_at: r.try_get("completed_at")?,
        metadata: r.try_get("metadata")?,
        version: r.try_get("version")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn log_from_row(r: &PgRow) -> Result<PaymentLogEntry> {
    let old_status: String = r.try_get("old_status")?;
    let new_status: String = r.try_get("new_status")?;
    Ok(PaymentLogEntry {
        id: r.try_get("id")?,
        payment_id: r.try_get("payment_id")?,
        event: r.try_get("event")?,
        old_status: parse_status(&old_status)?,
        new_status: parse_status(&new_status)?,
        message: r.try_get("message")?,
        metadata: r.try_get("metadata")?,
        created_at: r.try_get("created_at")?,
    })
}

#[async_trait::async_trait]
impl PaymentLedger for PaymentsRepo {
    async fn insert_payment(&self, payment: &Payment) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, order_id, gateway_order_id, gateway_payment_id, amount, currency,
                description, status, refunded_amount, refund_status, checkout_url, failure_reason,
                completed_at, metadata, version, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17
            )
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.gateway_order_id)
        .bind(&payment.gateway_payment_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.description)
        .bind(payment.status.as_str())
        .bind(payment.refunded_amount)
        .bind(&payment.refund_status)
        .bind(&payment.checkout_url)
        .bind(&payment.failure_reason)
        .bind(payment.completed_at)
        .bind(&payment.metadata)
        .bind(payment.version)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.constraint() == Some(ONE_OPEN_PER_ORDER) => {
                Ok(InsertOutcome::OpenPaymentExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway_order_id = $1"
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_open_for_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 AND status IN ('PENDING', 'AUTHORIZED') ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn update_payment(&self, payment: &Payment) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payments SET
                gateway_payment_id = $3,
                status = $4,
                refunded_amount = $5,
                refund_status = $6,
                failure_reason = $7,
                completed_at = $8,
                metadata = $9,
                version = version + 1,
                updated_at = now()
            WHERE payment_id = $1 AND version = $2
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment.id)
        .bind(payment.version)
        .bind(&payment.gateway_payment_id)
        .bind(payment.status.as_str())
        .bind(payment.refunded_amount)
        .bind(&payment.refund_status)
        .bind(&payment.failure_reason)
        .bind(payment.completed_at)
        .bind(&payment.metadata)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn append_log(&self, entry: &NewPaymentLogEntry) -> Result<PaymentLogEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO payment_logs (payment_id, event, old_status, new_status, message, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, payment_id, event, old_status, new_status, message, metadata, created_at
            "#,
        )
        .bind(entry.payment_id)
        .bind(&entry.event)
        .bind(entry.old_status.as_str())
        .bind(entry.new_status.as_str())
        .bind(&entry.message)
        .bind(&entry.metadata)
        .fetch_one(&self.pool)
        .await?;

        log_from_row(&row)
    }

    async fn list_logs(&self, payment_id: Uuid) -> Result<Vec<PaymentLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, event, old_status, new_status, message, metadata, created_at
            FROM payment_logs
            WHERE payment_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }

    async fn list_stale_open(&self, updated_before: DateTime<Utc>, limit: i64) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE status IN ('PENDING', 'AUTHORIZED') AND updated_at <= $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#
        ))
        .bind(updated_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
