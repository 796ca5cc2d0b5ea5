use crate::config::{AppConfig, GatewayAdapter};
use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod mock;
pub mod revolut;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    Automatic,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMode {
    Automatic,
    Forced,
}

#[derive(Debug, Clone)]
pub struct GatewayCustomer {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub customer: GatewayCustomer,
    pub capture_mode: CaptureMode,
    pub challenge_mode: ChallengeMode,
    pub redirect_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl CreateOrderRequest {
    /// Rejects requests the gateway is guaranteed to refuse.
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.amount_minor < 1 {
            return Err(PaymentError::Validation("amount_minor must be >= 1".to_string()));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PaymentError::Validation(format!(
                "invalid currency {:?}",
                self.currency
            )));
        }
        if self.customer.full_name.trim().is_empty() {
            return Err(PaymentError::Validation("customer name is required".to_string()));
        }
        if self.customer.email.trim().is_empty() {
            return Err(PaymentError::Validation("customer email is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub gateway_order_id: String,
    pub checkout_url: String,
    pub token: String,
}

/// Order state as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOrderState {
    Pending,
    Processing,
    Authorised,
    Completed,
    Cancelled,
    Failed,
    Other(String),
}

impl GatewayOrderState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => GatewayOrderState::Pending,
            "processing" => GatewayOrderState::Processing,
            "authorised" | "authorized" => GatewayOrderState::Authorised,
            "completed" => GatewayOrderState::Completed,
            "cancelled" | "canceled" => GatewayOrderState::Cancelled,
            "failed" | "declined" => GatewayOrderState::Failed,
            other => GatewayOrderState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GatewayOrderState::Pending => "pending",
            GatewayOrderState::Processing => "processing",
            GatewayOrderState::Authorised => "authorised",
            GatewayOrderState::Completed => "completed",
            GatewayOrderState::Cancelled => "cancelled",
            GatewayOrderState::Failed => "failed",
            GatewayOrderState::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
    pub state: GatewayOrderState,
    pub failure_reason: Option<String>,
}

/// Refunds are addressed to the gateway order. A payment id the gateway
/// reports later is kept on the payment for reference only.
#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub gateway_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub gateway_refund_id: String,
    pub state: String,
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_order(&self, request: CreateOrderRequest) -> Result<CreatedOrder, PaymentError>;

    async fn get_order(&self, gateway_order_id: &str) -> Result<GatewayOrder, PaymentError>;

    async fn refund(&self, request: RefundRequest) -> Result<GatewayRefund, PaymentError>;

    async fn capture(&self, gateway_order_id: &str) -> Result<GatewayOrder, PaymentError>;
}

pub fn build_gateway(cfg: &AppConfig) -> Arc<dyn PaymentGateway> {
    match cfg.gateway_adapter {
        GatewayAdapter::Revolut => {
            if cfg.gateway_api_key.is_empty() {
                tracing::warn!("GATEWAY_API_KEY is empty; gateway calls will be rejected");
            }
            Arc::new(revolut::RevolutGateway {
                base_url: cfg.gateway_base_url.trim_end_matches('/').to_string(),
                api_key: cfg.gateway_api_key.clone(),
                api_version: cfg.gateway_api_version.clone(),
                timeout_ms: cfg.gateway_timeout_ms,
                client: reqwest::Client::new(),
            })
        }
        GatewayAdapter::Mock(behavior) => {
            tracing::warn!(?behavior, "using the in-process mock gateway");
            Arc::new(mock::MockGateway::new(behavior))
        }
    }
}
