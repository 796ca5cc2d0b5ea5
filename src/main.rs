use payment_orders::config::AppConfig;
use payment_orders::gateways::build_gateway;
use payment_orders::http::middleware::rate_limit::RateLimitState;
use payment_orders::http::router::build_router;
use payment_orders::repo::orders_repo::OrdersRepo;
use payment_orders::repo::payments_repo::PaymentsRepo;
use payment_orders::service::payment_service::PaymentService;
use payment_orders::signature::WebhookVerifier;
use payment_orders::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let gateway = build_gateway(&cfg);

    let payment_service = PaymentService::new(
        Arc::new(PaymentsRepo { pool: pool.clone() }),
        gateway,
        Arc::new(OrdersRepo { pool: pool.clone() }),
        cfg.default_return_url.clone(),
    );

    let verifier = WebhookVerifier::new(
        cfg.webhook_secret.clone(),
        cfg.webhook_signature_mode,
        cfg.webhook_tolerance_secs,
    );

    let redis_client = redis::Client::open(cfg.redis_url.clone())?;
    let state = AppState::new(payment_service, verifier, Some(redis_client.clone()));

    let app = build_router(
        state,
        cfg.internal_api_key.clone(),
        Some(RateLimitState {
            redis_client,
            max_per_minute: cfg.rate_limit_per_minute,
        }),
    );

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
