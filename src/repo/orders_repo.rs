use crate::service::order_sync::{OrderStatusSync, UnpaidOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct OrdersRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl OrderStatusSync for OrdersRepo {
    async fn mark_order_paid(&self, order_id: Uuid, paid_at: DateTime<Utc>) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = 'PAID', paid_at = COALESCE(paid_at, $2), updated_at = now()
            WHERE order_id = $1 AND payment_status <> 'PAID'
            "#,
        )
        .bind(order_id)
        .bind(paid_at)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            tracing::debug!(%order_id, "order already paid or unknown; nothing to update");
        }
        Ok(())
    }

    async fn mark_order_failed_or_cancelled(&self, order_id: Uuid, outcome: UnpaidOutcome) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2, updated_at = now()
            WHERE order_id = $1 AND payment_status NOT IN ('PAID', $2)
            "#,
        )
        .bind(order_id)
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            tracing::debug!(%order_id, outcome = outcome.as_str(), "order unchanged");
        }
        Ok(())
    }
}
