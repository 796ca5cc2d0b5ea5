use crate::http::handlers::{ops, payments, webhooks};
use crate::http::middleware::admin_auth::require_internal_api_key;
use crate::http::middleware::rate_limit::{enforce, RateLimitState};
use crate::AppState;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

pub fn build_router(state: AppState, internal_api_key: String, rate_limit: Option<RateLimitState>) -> Router {
    let operator_routes = Router::new()
        .route("/payments/:payment_id/capture", post(payments::capture_payment))
        .route("/payments/:payment_id/refund", post(payments::refund_payment))
        .route("/payments/:payment_id/cancel", post(payments::cancel_payment))
        .route("/payments/:payment_id/logs", get(payments::list_logs))
        .layer(from_fn_with_state(internal_api_key, require_internal_api_key));

    let mut app = Router::new()
        .route("/health", get(payments::health))
        .route("/payments", post(payments::create_payment))
        .route("/payments/:payment_id", get(payments::get_payment))
        .route("/webhooks/gateway", post(webhooks::receive_gateway_webhook))
        .route("/ops/readiness", get(ops::readiness))
        .route("/ops/liveness", get(ops::liveness))
        .merge(operator_routes);

    if let Some(rate_limit) = rate_limit {
        app = app.layer(from_fn_with_state(rate_limit, enforce));
    }

    app.with_state(state)
}
