use crate::error::PaymentError;
use crate::gateways::{
    CreateOrderRequest, CreatedOrder, GatewayOrder, GatewayOrderState, GatewayRefund,
    PaymentGateway, RefundRequest,
};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    AlwaysSuccess,
    AlwaysDecline,
    AlwaysTimeout,
}

impl MockBehavior {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ALWAYS_DECLINE" => MockBehavior::AlwaysDecline,
            "ALWAYS_TIMEOUT" => MockBehavior::AlwaysTimeout,
            _ => MockBehavior::AlwaysSuccess,
        }
    }
}

#[derive(Default)]
struct MockState {
    orders: HashMap<String, GatewayOrderState>,
    calls: Vec<String>,
    next_id: u64,
}

/// In-process gateway used for local runs and tests. Orders start `pending`
/// and only move when [`MockGateway::set_order_state`] is called.
pub struct MockGateway {
    pub behavior: MockBehavior,
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            state: Mutex::new(MockState::default()),
        }
    }

    pub async fn set_order_state(&self, gateway_order_id: &str, state: GatewayOrderState) {
        self.state
            .lock()
            .await
            .orders
            .insert(gateway_order_id.to_string(), state);
    }

    pub async fn calls(&self, op: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.as_str() == op)
            .count()
    }

    fn fail(&self, op: &str) -> Option<PaymentError> {
        match self.behavior {
            MockBehavior::AlwaysSuccess => None,
            MockBehavior::AlwaysDecline => Some(PaymentError::Gateway {
                status: 400,
                code: "MOCK_DECLINED".to_string(),
                message: "mock decline".to_string(),
            }),
            MockBehavior::AlwaysTimeout => Some(PaymentError::GatewayTimeout(format!("{op}: mock timeout"))),
        }
    }

    async fn lookup(&self, op: &str, gateway_order_id: &str) -> Result<GatewayOrderState, PaymentError> {
        let mut state = self.state.lock().await;
        state.calls.push(op.to_string());
        if let Some(err) = self.fail(op) {
            return Err(err);
        }
        state
            .orders
            .get(gateway_order_id)
            .cloned()
            .ok_or_else(|| PaymentError::Gateway {
                status: 404,
                code: "ORDER_NOT_FOUND".to_string(),
                message: format!("order {gateway_order_id} not found"),
            })
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<CreatedOrder, PaymentError> {
        request.validate()?;

        let mut state = self.state.lock().await;
        state.calls.push("create_order".to_string());
        if let Some(err) = self.fail("create_order") {
            return Err(err);
        }

        state.next_id += 1;
        let gateway_order_id = format!("mock_ord_{}", state.next_id);
        state
            .orders
            .insert(gateway_order_id.clone(), GatewayOrderState::Pending);

        Ok(CreatedOrder {
            checkout_url: format!("https://checkout.mock/{gateway_order_id}"),
            token: format!("tok_{}", uuid::Uuid::new_v4().simple()),
            gateway_order_id,
        })
    }

    async fn get_order(&self, gateway_order_id: &str) -> Result<GatewayOrder, PaymentError> {
        let state = self.lookup("get_order", gateway_order_id).await?;
        Ok(GatewayOrder {
            gateway_order_id: gateway_order_id.to_string(),
            failure_reason: (state == GatewayOrderState::Failed).then(|| "do_not_honour".to_string()),
            state,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<GatewayRefund, PaymentError> {
        self.lookup("refund", &request.gateway_order_id).await?;
        Ok(GatewayRefund {
            gateway_refund_id: format!("mock_ref_{}", uuid::Uuid::new_v4().simple()),
            state: "completed".to_string(),
        })
    }

    async fn capture(&self, gateway_order_id: &str) -> Result<GatewayOrder, PaymentError> {
        self.lookup("capture", gateway_order_id).await?;
        self.set_order_state(gateway_order_id, GatewayOrderState::Completed)
            .await;
        Ok(GatewayOrder {
            gateway_order_id: gateway_order_id.to_string(),
            state: GatewayOrderState::Completed,
            failure_reason: None,
        })
    }
}
