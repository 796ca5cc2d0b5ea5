use crate::domain::payment::PaymentStatus;
use crate::error::PaymentError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventKind {
    OrderAuthorized,
    OrderCompleted,
    OrderPaymentFailed,
    OrderPaymentDeclined,
    OrderCancelled,
    DisputeActionRequired,
}

/// Wire name, kind and the status each event drives the payment towards.
/// New gateway event types are added here.
static EVENT_TABLE: [(&str, WebhookEventKind, PaymentStatus); 6] = [
    ("ORDER_AUTHORISED", WebhookEventKind::OrderAuthorized, PaymentStatus::Authorized),
    ("ORDER_COMPLETED", WebhookEventKind::OrderCompleted, PaymentStatus::Completed),
    ("ORDER_PAYMENT_FAILED", WebhookEventKind::OrderPaymentFailed, PaymentStatus::Failed),
    ("ORDER_PAYMENT_DECLINED", WebhookEventKind::OrderPaymentDeclined, PaymentStatus::Failed),
    ("ORDER_CANCELLED", WebhookEventKind::OrderCancelled, PaymentStatus::Cancelled),
    ("DISPUTE_ACTION_REQUIRED", WebhookEventKind::DisputeActionRequired, PaymentStatus::Disputed),
];

impl WebhookEventKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_uppercase();
        // Both spellings show up depending on the gateway's API version.
        let name = if name == "ORDER_AUTHORIZED" {
            "ORDER_AUTHORISED".to_string()
        } else {
            name
        };
        EVENT_TABLE
            .iter()
            .find(|(wire, _, _)| *wire == name)
            .map(|(_, kind, _)| *kind)
    }

    pub fn name(&self) -> &'static str {
        self.row().0
    }

    pub fn target_status(&self) -> PaymentStatus {
        self.row().2
    }

    fn row(&self) -> &'static (&'static str, WebhookEventKind, PaymentStatus) {
        EVENT_TABLE
            .iter()
            .find(|(_, kind, _)| kind == self)
            .unwrap_or(&EVENT_TABLE[0])
    }
}

/// Only the fields the reconciliation logic reads; the rest is kept opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ParsedWebhook {
    pub event_name: String,
    pub kind: Option<WebhookEventKind>,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub failure_reason: Option<String>,
    pub extra: serde_json::Value,
}

pub fn parse_webhook(raw: &[u8]) -> Result<ParsedWebhook, PaymentError> {
    let payload: WebhookPayload = serde_json::from_slice(raw)
        .map_err(|e| PaymentError::InvalidPayload(format!("malformed json: {e}")))?;

    if payload.event.trim().is_empty() {
        return Err(PaymentError::InvalidPayload("missing event".to_string()));
    }

    let gateway_order_id = payload
        .order_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| PaymentError::InvalidPayload("missing order_id".to_string()))?;

    Ok(ParsedWebhook {
        kind: WebhookEventKind::from_name(&payload.event),
        event_name: payload.event,
        gateway_order_id,
        gateway_payment_id: payload.payment_id.filter(|id| !id.is_empty()),
        failure_reason: payload.failure_reason.filter(|r| !r.is_empty()),
        extra: serde_json::Value::Object(payload.extra),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_event_maps_to_a_status() {
        assert_eq!(
            WebhookEventKind::from_name("ORDER_COMPLETED").map(|k| k.target_status()),
            Some(PaymentStatus::Completed)
        );
        assert_eq!(
            WebhookEventKind::from_name("ORDER_AUTHORIZED"),
            Some(WebhookEventKind::OrderAuthorized)
        );
        assert_eq!(
            WebhookEventKind::OrderPaymentFailed.target_status(),
            PaymentStatus::Failed
        );
        assert_eq!(
            WebhookEventKind::OrderCancelled.name(),
            "ORDER_CANCELLED"
        );
        assert_eq!(WebhookEventKind::from_name("ORDER_SHIPPED"), None);
    }

    #[test]
    fn parses_payload_and_keeps_extra_fields() {
        let raw = br#"{"event":"ORDER_PAYMENT_FAILED","order_id":"ord_1","failure_reason":"insufficient_funds","merchant_order_ext_ref":"abc"}"#;
        let parsed = parse_webhook(raw).unwrap();
        assert_eq!(parsed.kind, Some(WebhookEventKind::OrderPaymentFailed));
        assert_eq!(parsed.gateway_order_id, "ord_1");
        assert_eq!(parsed.failure_reason.as_deref(), Some("insufficient_funds"));
        assert_eq!(parsed.extra["merchant_order_ext_ref"], "abc");
    }

    #[test]
    fn missing_order_id_is_rejected() {
        let err = parse_webhook(br#"{"event":"ORDER_COMPLETED"}"#).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidPayload(_)));
        let err = parse_webhook(b"not json").unwrap_err();
        assert!(matches!(err, PaymentError::InvalidPayload(_)));
    }
}
