use crate::domain::money::{normalize_currency, to_minor_units};
use crate::domain::payment::{
    CreatePaymentRequest, CreatePaymentResponse, NewPaymentLogEntry, Payment, PaymentLogEntry,
    PaymentStatus, RefundPaymentRequest,
};
use crate::error::{PaymentError, PaymentResult};
use crate::gateways::{
    CaptureMode, ChallengeMode, CreateOrderRequest, GatewayCustomer, GatewayOrderState,
    PaymentGateway, RefundRequest,
};
use crate::repo::payments_repo::{InsertOutcome, PaymentLedger};
use crate::service::order_sync::OrderStatusSync;
use crate::service::transition::{TransitionEngine, TransitionOutcome, TransitionRequest};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentService {
    pub ledger: Arc<dyn PaymentLedger>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub transitions: TransitionEngine,
    pub default_return_url: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileSummary {
    pub examined: usize,
    pub changed: usize,
    pub failed: usize,
}

impl PaymentService {
    pub fn new(
        ledger: Arc<dyn PaymentLedger>,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderStatusSync>,
        default_return_url: Option<String>,
    ) -> Self {
        Self {
            transitions: TransitionEngine::new(ledger.clone(), orders),
            ledger,
            gateway,
            default_return_url,
        }
    }

    pub async fn create_payment(&self, req: CreatePaymentRequest) -> PaymentResult<CreatePaymentResponse> {
        let currency = normalize_currency(&req.currency)?;
        let amount_minor = to_minor_units(req.amount, &currency)?;
        if req.customer.name.trim().is_empty() || req.customer.email.trim().is_empty() {
            return Err(PaymentError::Validation(
                "customer name and email are required".to_string(),
            ));
        }

        if let Some(open) = self.ledger.find_open_for_order(req.order_id).await? {
            return Err(PaymentError::ActivePaymentExists(open.id));
        }

        let description = if req.description.trim().is_empty() {
            format!("Order {}", req.order_id)
        } else {
            req.description.clone()
        };

        let created = self
            .gateway
            .create_order(CreateOrderRequest {
                amount_minor,
                currency: currency.clone(),
                description: description.clone(),
                customer: GatewayCustomer {
                    full_name: req.customer.name.trim().to_string(),
                    email: req.customer.email.trim().to_string(),
                    phone: req.customer.phone.clone(),
                },
                capture_mode: CaptureMode::Automatic,
                challenge_mode: ChallengeMode::Automatic,
                redirect_url: req.return_url.clone().or_else(|| self.default_return_url.clone()),
                metadata: req.metadata.clone(),
            })
            .await
            .map_err(|e| {
                tracing::warn!(order_id = %req.order_id, "gateway order creation failed: {}", e);
                e
            })?;

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: req.order_id,
            gateway_order_id: created.gateway_order_id.clone(),
            // this gateway only names the payment by its order id at creation time
            gateway_payment_id: Some(created.gateway_order_id.clone()),
            amount: req.amount,
            currency,
            description,
            status: PaymentStatus::Pending,
            refunded_amount: Decimal::ZERO,
            refund_status: None,
            checkout_url: created.checkout_url.clone(),
            failure_reason: None,
            completed_at: None,
            metadata: json!({
                "gateway": self.gateway.name(),
                "token": created.token,
                "client": req.metadata,
            }),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        match self.ledger.insert_payment(&payment).await {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::OpenPaymentExists) => {
                // A concurrent create for the same order won; its gateway order is the live one.
                tracing::error!(
                    order_id = %req.order_id,
                    gateway_order_id = %created.gateway_order_id,
                    "gateway order created but another open payment was stored first; manual reconciliation required"
                );
                return Err(match self.ledger.find_open_for_order(req.order_id).await? {
                    Some(open) => PaymentError::ActivePaymentExists(open.id),
                    None => PaymentError::ConcurrentUpdate(payment.id),
                });
            }
            Err(e) => {
                tracing::error!(
                    order_id = %req.order_id,
                    gateway_order_id = %created.gateway_order_id,
                    "gateway order created but payment could not be persisted; manual reconciliation required: {:#}",
                    e
                );
                return Err(PaymentError::Storage(e));
            }
        }

        self.transitions
            .audit(NewPaymentLogEntry {
                payment_id: payment.id,
                event: "payment_created".to_string(),
                old_status: PaymentStatus::Pending,
                new_status: PaymentStatus::Pending,
                message: format!("created {} {} order", payment.amount, payment.currency),
                metadata: json!({ "gateway_order_id": payment.gateway_order_id }),
            })
            .await;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            gateway_order_id = %payment.gateway_order_id,
            "payment created"
        );

        Ok(CreatePaymentResponse {
            payment_id: payment.id,
            gateway_order_id: payment.gateway_order_id,
            checkout_url: payment.checkout_url,
            status: payment.status,
        })
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> PaymentResult<Payment> {
        self.ledger
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {payment_id}")))
    }

    /// Local record, refreshed from the gateway while the outcome is still open.
    pub async fn get_status(&self, payment_id: Uuid) -> PaymentResult<Payment> {
        let payment = self.get_payment(payment_id).await?;
        self.reconcile(payment).await
    }

    pub async fn reconcile(&self, payment: Payment) -> PaymentResult<Payment> {
        if !payment.status.is_open() {
            return Ok(payment);
        }

        let order = match self.gateway.get_order(&payment.gateway_order_id).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    gateway_order_id = %payment.gateway_order_id,
                    "status poll failed, returning local state: {}",
                    e
                );
                return Ok(payment);
            }
        };

        let Some(target) = status_for_gateway_state(&order.state) else {
            return Ok(payment);
        };
        if target == payment.status {
            return Ok(payment);
        }

        let outcome = self
            .transitions
            .transition(
                payment.id,
                TransitionRequest::new(target, "status_polled")
                    .with_failure_reason(order.failure_reason.clone())
                    .with_metadata(json!({ "gateway_state": order.state.as_str() })),
            )
            .await?;
        Ok(outcome.into_payment())
    }

    pub async fn capture(&self, payment_id: Uuid) -> PaymentResult<Payment> {
        let payment = self.get_payment(payment_id).await?;
        if payment.status != PaymentStatus::Authorized {
            return Err(PaymentError::IllegalTransition {
                from: payment.status,
                to: PaymentStatus::Completed,
            });
        }

        let order = self.gateway.capture(&payment.gateway_order_id).await?;
        let outcome = self
            .transitions
            .transition(
                payment_id,
                TransitionRequest::new(PaymentStatus::Completed, "payment_captured")
                    .with_metadata(json!({ "gateway_state": order.state.as_str() })),
            )
            .await?;

        match outcome {
            TransitionOutcome::Applied { payment, .. } => Ok(payment),
            // a webhook may have completed it while the capture call was in flight
            TransitionOutcome::Rejected { payment, .. } if payment.status == PaymentStatus::Completed => Ok(payment),
            TransitionOutcome::Rejected { payment, requested } => Err(PaymentError::IllegalTransition {
                from: payment.status,
                to: requested,
            }),
        }
    }

    pub async fn refund(&self, payment_id: Uuid, req: RefundPaymentRequest) -> PaymentResult<Payment> {
        if req.amount <= Decimal::ZERO {
            return Err(PaymentError::Validation("refund amount must be > 0".to_string()));
        }

        let payment = self.get_payment(payment_id).await?;
        if !payment.can_refund() {
            return Err(PaymentError::IllegalTransition {
                from: payment.status,
                to: PaymentStatus::Refunded,
            });
        }
        if req.amount > payment.refundable_balance() {
            return Err(PaymentError::Validation(format!(
                "refund of {} exceeds refundable balance {}",
                req.amount,
                payment.refundable_balance()
            )));
        }

        let amount_minor = to_minor_units(req.amount, &payment.currency)?;
        let refund = self
            .gateway
            .refund(RefundRequest {
                gateway_order_id: payment.gateway_order_id.clone(),
                amount_minor,
                currency: payment.currency.clone(),
                reason: req.reason.clone(),
            })
            .await?;

        self.transitions
            .record_refund(payment_id, req.amount, &refund, req.reason.as_deref())
            .await
    }

    pub async fn cancel(&self, payment_id: Uuid) -> PaymentResult<Payment> {
        let payment = self.get_payment(payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(PaymentError::IllegalTransition {
                from: payment.status,
                to: PaymentStatus::Cancelled,
            });
        }

        match self
            .transitions
            .transition(
                payment_id,
                TransitionRequest::new(PaymentStatus::Cancelled, "payment_cancelled"),
            )
            .await?
        {
            TransitionOutcome::Applied { payment, .. } => Ok(payment),
            TransitionOutcome::Rejected { payment, requested } => Err(PaymentError::IllegalTransition {
                from: payment.status,
                to: requested,
            }),
        }
    }

    pub async fn list_logs(&self, payment_id: Uuid) -> PaymentResult<Vec<PaymentLogEntry>> {
        self.get_payment(payment_id).await?;
        Ok(self.ledger.list_logs(payment_id).await?)
    }

    /// One polling pass over open payments that have not moved for `stale_after`.
    pub async fn reconcile_stale(&self, stale_after: chrono::Duration, limit: i64) -> PaymentResult<ReconcileSummary> {
        let due = self
            .ledger
            .list_stale_open(Utc::now() - stale_after, limit)
            .await?;

        let mut summary = ReconcileSummary {
            examined: due.len(),
            ..ReconcileSummary::default()
        };
        for payment in due {
            let before = payment.status;
            let payment_id = payment.id;
            match self.reconcile(payment).await {
                Ok(after) if after.status != before => summary.changed += 1,
                Ok(_) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(%payment_id, "reconciliation failed: {}", e);
                }
            }
        }

        Ok(summary)
    }
}

pub fn status_for_gateway_state(state: &GatewayOrderState) -> Option<PaymentStatus> {
    match state {
        GatewayOrderState::Authorised => Some(PaymentStatus::Authorized),
        GatewayOrderState::Completed => Some(PaymentStatus::Completed),
        GatewayOrderState::Cancelled => Some(PaymentStatus::Cancelled),
        GatewayOrderState::Failed => Some(PaymentStatus::Failed),
        GatewayOrderState::Pending | GatewayOrderState::Processing | GatewayOrderState::Other(_) => None,
    }
}
