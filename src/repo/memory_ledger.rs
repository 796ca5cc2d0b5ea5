use crate::domain::payment::{NewPaymentLogEntry, Payment, PaymentLogEntry};
use crate::repo::payments_repo::{InsertOutcome, PaymentLedger};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local ledger backing the service and HTTP tests.
#[derive(Default)]
pub struct InMemoryLedger {
    payments: RwLock<HashMap<Uuid, Payment>>,
    logs: RwLock<Vec<PaymentLogEntry>>,
    reject_log_appends: AtomicBool,
    stall_updates: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `append_log` fail, to exercise audit-write failures.
    pub fn reject_log_appends(&self, reject: bool) {
        self.reject_log_appends.store(reject, Ordering::SeqCst);
    }

    /// Makes every subsequent `update_payment` lose its version check.
    pub fn stall_updates(&self, stall: bool) {
        self.stall_updates.store(stall, Ordering::SeqCst);
    }

    pub async fn log_count(&self, payment_id: Uuid) -> usize {
        self.logs
            .read()
            .await
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .count()
    }
}

#[async_trait::async_trait]
impl PaymentLedger for InMemoryLedger {
    async fn insert_payment(&self, payment: &Payment) -> Result<InsertOutcome> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id)
            || payments
                .values()
                .any(|p| p.gateway_order_id == payment.gateway_order_id)
        {
            bail!("duplicate payment {}", payment.id);
        }
        if payment.status.is_open()
            && payments
                .values()
                .any(|p| p.order_id == payment.order_id && p.status.is_open())
        {
            return Ok(InsertOutcome::OpenPaymentExists);
        }
        payments.insert(payment.id, payment.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(&payment_id).cloned())
    }

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.gateway_order_id == gateway_order_id)
            .cloned())
    }

    async fn find_open_for_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .filter(|p| p.order_id == order_id && p.status.is_open())
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<Option<Payment>> {
        if self.stall_updates.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let mut payments = self.payments.write().await;
        let Some(stored) = payments.get_mut(&payment.id) else {
            return Ok(None);
        };
        if stored.version != payment.version {
            return Ok(None);
        }

        let mut updated = payment.clone();
        updated.version += 1;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(Some(updated))
    }

    async fn append_log(&self, entry: &NewPaymentLogEntry) -> Result<PaymentLogEntry> {
        if self.reject_log_appends.load(Ordering::SeqCst) {
            bail!("audit log unavailable");
        }

        let mut logs = self.logs.write().await;
        let stored = PaymentLogEntry {
            id: logs.len() as i64 + 1,
            payment_id: entry.payment_id,
            event: entry.event.clone(),
            old_status: entry.old_status,
            new_status: entry.new_status,
            message: entry.message.clone(),
            metadata: entry.metadata.clone(),
            created_at: Utc::now(),
        };
        logs.push(stored.clone());
        Ok(stored)
    }

    async fn list_logs(&self, payment_id: Uuid) -> Result<Vec<PaymentLogEntry>> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn list_stale_open(&self, updated_before: DateTime<Utc>, limit: i64) -> Result<Vec<Payment>> {
        let mut stale: Vec<Payment> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| p.status.is_open() && p.updated_at <= updated_before)
            .cloned()
            .collect();
        stale.sort_by_key(|p| p.updated_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
