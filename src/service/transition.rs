use crate::domain::payment::{NewPaymentLogEntry, Payment, PaymentStatus};
use crate::error::{PaymentError, PaymentResult};
use crate::gateways::GatewayRefund;
use crate::repo::payments_repo::PaymentLedger;
use crate::service::order_sync::{OrderStatusSync, UnpaidOutcome};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const MAX_CONFLICT_RETRIES: usize = 5;

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub target: PaymentStatus,
    pub event: String,
    pub failure_reason: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl TransitionRequest {
    pub fn new(target: PaymentStatus, event: impl Into<String>) -> Self {
        Self {
            target,
            event: event.into(),
            failure_reason: None,
            gateway_payment_id: None,
            metadata: json!({}),
        }
    }

    pub fn with_failure_reason(mut self, reason: Option<String>) -> Self {
        self.failure_reason = reason;
        self
    }

    pub fn with_gateway_payment_id(mut self, id: Option<String>) -> Self {
        self.gateway_payment_id = id;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied {
        from: PaymentStatus,
        payment: Payment,
    },
    /// Not reachable from the stored status. The row is untouched.
    Rejected {
        requested: PaymentStatus,
        payment: Payment,
    },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }

    pub fn payment(&self) -> &Payment {
        match self {
            TransitionOutcome::Applied { payment, .. } | TransitionOutcome::Rejected { payment, .. } => payment,
        }
    }

    pub fn into_payment(self) -> Payment {
        match self {
            TransitionOutcome::Applied { payment, .. } | TransitionOutcome::Rejected { payment, .. } => payment,
        }
    }
}

/// The only code path that changes `Payment::status`. Polling, webhooks and
/// the synchronous operations all go through here.
#[derive(Clone)]
pub struct TransitionEngine {
    pub ledger: Arc<dyn PaymentLedger>,
    pub orders: Arc<dyn OrderStatusSync>,
}

impl TransitionEngine {
    pub fn new(ledger: Arc<dyn PaymentLedger>, orders: Arc<dyn OrderStatusSync>) -> Self {
        Self { ledger, orders }
    }

    pub async fn transition(
        &self,
        payment_id: Uuid,
        request: TransitionRequest,
    ) -> PaymentResult<TransitionOutcome> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            // Reachability is always judged against the row as stored now.
            let current = self.load(payment_id).await?;
            if !current.status.can_transition_to(request.target) {
                return Ok(self.reject(current, &request).await);
            }

            let mut next = current.clone();
            apply_status(&mut next, &request, Utc::now());

            match self.ledger.update_payment(&next).await? {
                Some(stored) => {
                    tracing::info!(
                        %payment_id,
                        event = %request.event,
                        from = %current.status,
                        to = %stored.status,
                        "payment transition applied"
                    );
                    self.sync_order(&stored).await;
                    self.audit(NewPaymentLogEntry {
                        payment_id,
                        event: request.event.clone(),
                        old_status: current.status,
                        new_status: stored.status,
                        message: format!("{} -> {}", current.status, stored.status),
                        metadata: request.metadata.clone(),
                    })
                    .await;
                    return Ok(TransitionOutcome::Applied {
                        from: current.status,
                        payment: stored,
                    });
                }
                None => {
                    tracing::debug!(%payment_id, event = %request.event, "version conflict, re-reading payment");
                }
            }
        }

        tracing::warn!(%payment_id, event = %request.event, "gave up after repeated version conflicts");
        Err(PaymentError::ConcurrentUpdate(payment_id))
    }

    /// Adds a gateway-confirmed refund to the running total, moving the
    /// payment to `Refunded` once the full amount has been returned.
    pub async fn record_refund(
        &self,
        payment_id: Uuid,
        amount: Decimal,
        refund: &GatewayRefund,
        reason: Option<&str>,
    ) -> PaymentResult<Payment> {
        let metadata = json!({
            "amount": amount.to_string(),
            "gateway_refund_id": refund.gateway_refund_id,
            "refund_state": refund.state,
            "reason": reason,
        });

        let mut last_seen = PaymentStatus::Completed;
        for _ in 0..MAX_CONFLICT_RETRIES {
            let current = self.load(payment_id).await?;
            last_seen = current.status;
            if amount > current.refundable_balance() {
                tracing::error!(
                    %payment_id,
                    gateway_refund_id = %refund.gateway_refund_id,
                    %amount,
                    "gateway refund succeeded but the remaining balance no longer covers it; manual reconciliation required"
                );
                self.audit(NewPaymentLogEntry {
                    payment_id,
                    event: "refund_unreconciled".to_string(),
                    old_status: current.status,
                    new_status: current.status,
                    message: format!("refund of {amount} exceeds remaining balance {}", current.refundable_balance()),
                    metadata: metadata.clone(),
                })
                .await;
                return Err(PaymentError::ConcurrentUpdate(payment_id));
            }

            let mut next = current.clone();
            next.refunded_amount += amount;
            next.refund_status = Some(refund.state.clone());
            if next.refunded_amount >= next.amount && current.status.can_transition_to(PaymentStatus::Refunded) {
                next.status = PaymentStatus::Refunded;
            }

            if let Some(stored) = self.ledger.update_payment(&next).await? {
                tracing::info!(
                    %payment_id,
                    %amount,
                    refunded_total = %stored.refunded_amount,
                    status = %stored.status,
                    "refund recorded"
                );
                self.audit(NewPaymentLogEntry {
                    payment_id,
                    event: "payment_refunded".to_string(),
                    old_status: current.status,
                    new_status: stored.status,
                    message: format!("refunded {amount} {}, total {}", stored.currency, stored.refunded_amount),
                    metadata,
                })
                .await;
                return Ok(stored);
            }
        }

        tracing::error!(
            %payment_id,
            gateway_refund_id = %refund.gateway_refund_id,
            %amount,
            "gateway refund succeeded but could not be recorded after repeated version conflicts; manual reconciliation required"
        );
        self.audit(NewPaymentLogEntry {
            payment_id,
            event: "refund_unreconciled".to_string(),
            old_status: last_seen,
            new_status: last_seen,
            message: format!("refund of {amount} not recorded after repeated version conflicts"),
            metadata,
        })
        .await;
        Err(PaymentError::ConcurrentUpdate(payment_id))
    }

    async fn load(&self, payment_id: Uuid) -> PaymentResult<Payment> {
        self.ledger
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {payment_id}")))
    }

    async fn reject(&self, current: Payment, request: &TransitionRequest) -> TransitionOutcome {
        let duplicate = current.status == request.target;
        if duplicate {
            tracing::info!(
                payment_id = %current.id,
                event = %request.event,
                status = %current.status,
                "duplicate transition ignored"
            );
            // The first delivery may have failed to reach the order module.
            self.sync_order(&current).await;
        } else {
            tracing::warn!(
                payment_id = %current.id,
                event = %request.event,
                from = %current.status,
                to = %request.target,
                "illegal transition rejected"
            );
        }

        self.audit(NewPaymentLogEntry {
            payment_id: current.id,
            event: request.event.clone(),
            old_status: current.status,
            new_status: current.status,
            message: if duplicate {
                format!("duplicate: already {}", current.status)
            } else {
                format!("rejected: {} -> {} not allowed", current.status, request.target)
            },
            metadata: json!({
                "requested_status": request.target,
                "event_metadata": request.metadata,
            }),
        })
        .await;

        TransitionOutcome::Rejected {
            requested: request.target,
            payment: current,
        }
    }

    async fn sync_order(&self, payment: &Payment) {
        let result = match payment.status {
            PaymentStatus::Completed => {
                let paid_at = payment.completed_at.unwrap_or_else(Utc::now);
                self.orders.mark_order_paid(payment.order_id, paid_at).await
            }
            PaymentStatus::Failed => {
                self.orders
                    .mark_order_failed_or_cancelled(payment.order_id, UnpaidOutcome::PaymentFailed)
                    .await
            }
            PaymentStatus::Cancelled => {
                self.orders
                    .mark_order_failed_or_cancelled(payment.order_id, UnpaidOutcome::Cancelled)
                    .await
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            tracing::error!(
                payment_id = %payment.id,
                order_id = %payment.order_id,
                status = %payment.status,
                "order status sync failed: {:#}",
                e
            );
        }
    }

    /// Audit failures never undo a committed status change.
    pub(crate) async fn audit(&self, entry: NewPaymentLogEntry) {
        if let Err(e) = self.ledger.append_log(&entry).await {
            tracing::error!(
                payment_id = %entry.payment_id,
                event = %entry.event,
                old_status = %entry.old_status,
                new_status = %entry.new_status,
                "failed to write payment audit entry: {:#}",
                e
            );
        }
    }
}

fn apply_status(payment: &mut Payment, request: &TransitionRequest, now: DateTime<Utc>) {
    payment.status = request.target;
    match request.target {
        PaymentStatus::Completed if payment.completed_at.is_none() => {
            payment.completed_at = Some(now);
        }
        PaymentStatus::Failed => {
            payment.failure_reason = request.failure_reason.clone();
        }
        _ => {}
    }
    if let Some(id) = &request.gateway_payment_id {
        payment.gateway_payment_id = Some(id.clone());
    }
}
