use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnpaidOutcome {
    PaymentFailed,
    Cancelled,
}

impl UnpaidOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnpaidOutcome::PaymentFailed => "PAYMENT_FAILED",
            UnpaidOutcome::Cancelled => "CANCELLED",
        }
    }
}

/// The two calls the order module exposes to payments. Both must be safe to
/// repeat: polling and webhook delivery can report the same outcome twice.
#[async_trait::async_trait]
pub trait OrderStatusSync: Send + Sync {
    async fn mark_order_paid(&self, order_id: Uuid, paid_at: DateTime<Utc>) -> Result<()>;

    async fn mark_order_failed_or_cancelled(&self, order_id: Uuid, outcome: UnpaidOutcome) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OrderPaymentState {
    Paid { paid_at: DateTime<Utc> },
    Unpaid(UnpaidOutcome),
}

/// Order module stand-in that records the resulting state and every call.
#[derive(Default)]
pub struct InMemoryOrderBook {
    orders: RwLock<HashMap<Uuid, OrderPaymentState>>,
    calls: RwLock<Vec<(Uuid, &'static str)>>,
}

impl InMemoryOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self, order_id: Uuid) -> Option<OrderPaymentState> {
        self.orders.read().await.get(&order_id).cloned()
    }

    pub async fn call_count(&self, order_id: Uuid) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|(id, _)| *id == order_id)
            .count()
    }
}

#[async_trait::async_trait]
impl OrderStatusSync for InMemoryOrderBook {
    async fn mark_order_paid(&self, order_id: Uuid, paid_at: DateTime<Utc>) -> Result<()> {
        self.calls.write().await.push((order_id, "mark_paid"));
        let mut orders = self.orders.write().await;
        if !matches!(orders.get(&order_id), Some(OrderPaymentState::Paid { .. })) {
            orders.insert(order_id, OrderPaymentState::Paid { paid_at });
        }
        Ok(())
    }

    async fn mark_order_failed_or_cancelled(&self, order_id: Uuid, outcome: UnpaidOutcome) -> Result<()> {
        self.calls.write().await.push((order_id, outcome.as_str()));
        let mut orders = self.orders.write().await;
        // a paid order is never downgraded by a stale attempt
        if !matches!(orders.get(&order_id), Some(OrderPaymentState::Paid { .. })) {
            orders.insert(order_id, OrderPaymentState::Unpaid(outcome));
        }
        Ok(())
    }
}
