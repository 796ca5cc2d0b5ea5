use crate::domain::payment::{NewPaymentLogEntry, PaymentStatus};
use crate::domain::webhook::parse_webhook;
use crate::error::{PaymentError, PaymentResult};
use crate::repo::payments_repo::PaymentLedger;
use crate::service::transition::{TransitionEngine, TransitionOutcome, TransitionRequest};
use crate::signature::WebhookVerifier;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied {
        payment_id: Uuid,
        status: PaymentStatus,
    },
    /// Duplicate or out-of-order delivery; recorded but not applied.
    Rejected {
        payment_id: Uuid,
        status: PaymentStatus,
    },
    Ignored {
        payment_id: Uuid,
        event: String,
    },
}

#[derive(Clone)]
pub struct WebhookProcessor {
    pub verifier: WebhookVerifier,
    pub ledger: Arc<dyn PaymentLedger>,
    pub transitions: TransitionEngine,
}

impl WebhookProcessor {
    pub fn new(verifier: WebhookVerifier, transitions: TransitionEngine) -> Self {
        Self {
            verifier,
            ledger: transitions.ledger.clone(),
            transitions,
        }
    }

    /// `raw` must be the body exactly as received; the signature covers bytes.
    pub async fn process(&self, raw: &[u8], signature: &str, timestamp: &str) -> PaymentResult<WebhookOutcome> {
        if !self.verifier.verify(raw, signature, timestamp) {
            tracing::warn!(timestamp, body_len = raw.len(), "webhook signature verification failed");
            return Err(PaymentError::SignatureInvalid);
        }

        let event = parse_webhook(raw).map_err(|e| {
            tracing::warn!("unparseable webhook: {}", e);
            e
        })?;

        let payment = self
            .ledger
            .find_by_gateway_order_id(&event.gateway_order_id)
            .await?
            .ok_or_else(|| {
                // usually the creating request has not committed yet; the gateway will redeliver
                tracing::warn!(
                    gateway_order_id = %event.gateway_order_id,
                    event = %event.event_name,
                    "webhook for unknown gateway order"
                );
                PaymentError::NotFound(format!("gateway order {}", event.gateway_order_id))
            })?;

        let Some(kind) = event.kind else {
            tracing::info!(
                payment_id = %payment.id,
                event = %event.event_name,
                "unhandled webhook event type ignored"
            );
            self.transitions
                .audit(NewPaymentLogEntry {
                    payment_id: payment.id,
                    event: format!("webhook_ignored:{}", event.event_name),
                    old_status: payment.status,
                    new_status: payment.status,
                    message: "unrecognised event type".to_string(),
                    metadata: event.extra,
                })
                .await;
            return Ok(WebhookOutcome::Ignored {
                payment_id: payment.id,
                event: event.event_name,
            });
        };

        let target = kind.target_status();
        let request = TransitionRequest::new(target, format!("webhook:{}", kind.name()))
            .with_failure_reason(if target == PaymentStatus::Failed {
                event.failure_reason.clone()
            } else {
                None
            })
            .with_gateway_payment_id(event.gateway_payment_id.clone())
            .with_metadata(json!({
                "gateway_order_id": event.gateway_order_id,
                "payload": event.extra,
            }));

        Ok(match self.transitions.transition(payment.id, request).await? {
            TransitionOutcome::Applied { payment, .. } => WebhookOutcome::Applied {
                payment_id: payment.id,
                status: payment.status,
            },
            TransitionOutcome::Rejected { payment, .. } => WebhookOutcome::Rejected {
                payment_id: payment.id,
                status: payment.status,
            },
        })
    }
}
