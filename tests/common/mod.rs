#![allow(dead_code)]

use payment_orders::domain::payment::{
    CreatePaymentRequest, CreatePaymentResponse, CustomerInfo, Payment, PaymentStatus,
};
use payment_orders::error::PaymentResult;
use payment_orders::gateways::mock::{MockBehavior, MockGateway};
use payment_orders::repo::memory_ledger::InMemoryLedger;
use payment_orders::repo::payments_repo::PaymentLedger;
use payment_orders::service::order_sync::InMemoryOrderBook;
use payment_orders::service::payment_service::PaymentService;
use payment_orders::service::webhook_processor::{WebhookOutcome, WebhookProcessor};
use payment_orders::signature::{sign_payload, SignatureMode, WebhookVerifier};
use payment_orders::AppState;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "wsk_test_5f2c9a";

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub orders: Arc<InMemoryOrderBook>,
    pub gateway: Arc<MockGateway>,
    pub service: PaymentService,
    pub processor: WebhookProcessor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::AlwaysSuccess)
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let orders = Arc::new(InMemoryOrderBook::new());
        let gateway = Arc::new(MockGateway::new(behavior));
        let service = PaymentService::new(ledger.clone(), gateway.clone(), orders.clone(), None);
        let processor = WebhookProcessor::new(verifier(), service.transitions.clone());
        Self {
            ledger,
            orders,
            gateway,
            service,
            processor,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.service.clone(), verifier(), None)
    }

    pub async fn create(&self, amount: &str, currency: &str) -> CreatePaymentResponse {
        self.service
            .create_payment(create_request(Uuid::new_v4(), amount, currency))
            .await
            .unwrap()
    }

    pub async fn deliver(&self, event: &str, gateway_order_id: &str) -> PaymentResult<WebhookOutcome> {
        let body = webhook_body(event, gateway_order_id);
        let (signature, timestamp) = sign(&body);
        self.processor.process(&body, &signature, &timestamp).await
    }

    pub async fn payment(&self, payment_id: Uuid) -> Payment {
        self.ledger.find_payment(payment_id).await.unwrap().unwrap()
    }
}

pub fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(Some(WEBHOOK_SECRET.to_string()), SignatureMode::Strict, None)
}

pub fn create_request(order_id: Uuid, amount: &str, currency: &str) -> CreatePaymentRequest {
    CreatePaymentRequest {
        order_id,
        amount: amount.parse::<Decimal>().unwrap(),
        currency: currency.to_string(),
        description: String::new(),
        customer: CustomerInfo {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
        },
        return_url: Some("https://shop.example.com/return".to_string()),
        metadata: None,
    }
}

pub fn webhook_body(event: &str, gateway_order_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "event": event,
        "order_id": gateway_order_id,
        "merchant_order_ext_ref": "ext-1"
    }))
    .unwrap()
}

pub fn sign(body: &[u8]) -> (String, String) {
    let timestamp = chrono::Utc::now().timestamp_millis().to_string();
    (sign_payload(WEBHOOK_SECRET, body, &timestamp), timestamp)
}

pub fn payment_in(status: PaymentStatus) -> Payment {
    let now = chrono::Utc::now();
    let gateway_order_id = format!("ord_{}", Uuid::new_v4().simple());
    Payment {
        id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        gateway_payment_id: Some(gateway_order_id.clone()),
        gateway_order_id: gateway_order_id.clone(),
        amount: Decimal::new(2500, 2),
        currency: "GBP".to_string(),
        description: "test order".to_string(),
        status,
        refunded_amount: Decimal::ZERO,
        refund_status: None,
        checkout_url: format!("https://checkout.test/{gateway_order_id}"),
        failure_reason: None,
        completed_at: None,
        metadata: serde_json::json!({}),
        version: 0,
        created_at: now,
        updated_at: now,
    }
}
