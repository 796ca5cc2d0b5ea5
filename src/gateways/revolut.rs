use crate::error::PaymentError;
use crate::gateways::{
    CreateOrderRequest, CreatedOrder, GatewayOrder, GatewayOrderState, GatewayRefund,
    PaymentGateway, RefundRequest,
};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

pub struct RevolutGateway {
    pub base_url: String,
    pub api_key: String,
    pub api_version: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    id: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    checkout_url: Option<String>,
    #[serde(default)]
    payments: Vec<PaymentBody>,
}

#[derive(Debug, Deserialize)]
struct PaymentBody {
    #[serde(default)]
    decline_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "errorId")]
    error_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RevolutGateway {
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header("Revolut-Api-Version", &self.api_version)
            .header("Accept", "application/json")
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
    }

    async fn send(&self, builder: RequestBuilder, op: &str) -> Result<OrderBody, PaymentError> {
        let resp = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| call_error(op, e))?;

        if !resp.status().is_success() {
            return Err(gateway_error(resp).await);
        }

        // The request timeout also covers reading the body.
        resp.json::<OrderBody>().await.map_err(|e| {
            if e.is_timeout() {
                call_error(op, e)
            } else {
                PaymentError::Transport(format!("{op}: unreadable response: {e}"))
            }
        })
    }
}

fn call_error(op: &str, e: reqwest::Error) -> PaymentError {
    if e.is_timeout() {
        tracing::warn!(op, "gateway call timed out");
        PaymentError::GatewayTimeout(format!("{op}: {e}"))
    } else {
        PaymentError::Transport(format!("{op}: {e}"))
    }
}

async fn gateway_error(resp: Response) -> PaymentError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

    PaymentError::Gateway {
        status,
        code: body
            .code
            .or(body.error_id)
            .unwrap_or_else(|| format!("HTTP_{status}")),
        message: body
            .message
            .unwrap_or_else(|| text.chars().take(200).collect()),
    }
}

fn to_gateway_order(body: OrderBody) -> GatewayOrder {
    GatewayOrder {
        failure_reason: body.payments.last().and_then(|p| p.decline_reason.clone()),
        state: GatewayOrderState::parse(body.state.as_deref().unwrap_or("pending")),
        gateway_order_id: body.id,
    }
}

#[async_trait::async_trait]
impl PaymentGateway for RevolutGateway {
    fn name(&self) -> &'static str {
        "revolut"
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<CreatedOrder, PaymentError> {
        request.validate()?;

        let mut body = json!({
            "amount": request.amount_minor,
            "currency": request.currency,
            "description": request.description,
            "capture_mode": request.capture_mode,
            "customer": {
                "full_name": request.customer.full_name,
                "email": request.customer.email,
            },
        });
        if let Some(phone) = &request.customer.phone {
            body["customer"]["phone"] = json!(phone);
        }
        if let Some(url) = &request.redirect_url {
            body["redirect_url"] = json!(url);
        }
        if let Some(metadata) = &request.metadata {
            body["metadata"] = metadata.clone();
        }
        body["enforce_challenge"] = json!(request.challenge_mode);

        let order = self
            .send(
                self.client
                    .post(format!("{}/api/orders", self.base_url))
                    .json(&body),
                "create_order",
            )
            .await?;

        let checkout_url = order.checkout_url.clone().ok_or_else(|| {
            PaymentError::Transport("create_order: response missing checkout_url".to_string())
        })?;

        Ok(CreatedOrder {
            token: order.token.unwrap_or_default(),
            gateway_order_id: order.id,
            checkout_url,
        })
    }

    async fn get_order(&self, gateway_order_id: &str) -> Result<GatewayOrder, PaymentError> {
        let order = self
            .send(
                self.client
                    .get(format!("{}/api/orders/{}", self.base_url, gateway_order_id)),
                "get_order",
            )
            .await?;
        Ok(to_gateway_order(order))
    }

    // Refunds are keyed by order, not by the individual payment attempt.
    async fn refund(&self, request: RefundRequest) -> Result<GatewayRefund, PaymentError> {
        if request.amount_minor < 1 {
            return Err(PaymentError::Validation("refund amount must be >= 1".to_string()));
        }

        let mut body = json!({
            "amount": request.amount_minor,
            "currency": request.currency,
        });
        if let Some(reason) = &request.reason {
            body["description"] = json!(reason);
        }

        let refund = self
            .send(
                self.client
                    .post(format!(
                        "{}/api/orders/{}/refund",
                        self.base_url, request.gateway_order_id
                    ))
                    .json(&body),
                "refund",
            )
            .await?;

        Ok(GatewayRefund {
            gateway_refund_id: refund.id,
            state: refund.state.unwrap_or_else(|| "pending".to_string()),
        })
    }

    async fn capture(&self, gateway_order_id: &str) -> Result<GatewayOrder, PaymentError> {
        let order = self
            .send(
                self.client
                    .post(format!("{}/api/orders/{}/capture", self.base_url, gateway_order_id))
                    .json(&json!({})),
                "capture",
            )
            .await?;
        Ok(to_gateway_order(order))
    }
}
