pub mod config;
pub mod domain {
    pub mod money;
    pub mod payment;
    pub mod webhook;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod ops;
        pub mod payments;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod admin_auth;
        pub mod rate_limit;
    }
    pub mod router;
}
pub mod repo {
    pub mod memory_ledger;
    pub mod orders_repo;
    pub mod payments_repo;
}
pub mod service {
    pub mod order_sync;
    pub mod payment_service;
    pub mod transition;
    pub mod webhook_processor;
}
pub mod signature;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub payment_service: service::payment_service::PaymentService,
    pub webhook_processor: service::webhook_processor::WebhookProcessor,
    pub ledger: Arc<dyn repo::payments_repo::PaymentLedger>,
    pub redis_client: Option<redis::Client>,
}

impl AppState {
    /// Both services share one transition engine, so every status change goes
    /// through the same ledger and order adapter.
    pub fn new(
        payment_service: service::payment_service::PaymentService,
        verifier: signature::WebhookVerifier,
        redis_client: Option<redis::Client>,
    ) -> Self {
        let webhook_processor = service::webhook_processor::WebhookProcessor::new(
            verifier,
            payment_service.transitions.clone(),
        );
        Self {
            ledger: payment_service.ledger.clone(),
            payment_service,
            webhook_processor,
            redis_client,
        }
    }
}
