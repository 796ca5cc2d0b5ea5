use anyhow::Result;
use payment_orders::config::AppConfig;
use payment_orders::gateways::build_gateway;
use payment_orders::repo::orders_repo::OrdersRepo;
use payment_orders::repo::payments_repo::PaymentsRepo;
use payment_orders::service::payment_service::PaymentService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Polls the gateway for payments whose webhook never arrived.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;

    let gateway = build_gateway(&cfg);

    let service = PaymentService::new(
        Arc::new(PaymentsRepo { pool: pool.clone() }),
        gateway,
        Arc::new(OrdersRepo { pool }),
        cfg.default_return_url.clone(),
    );

    let stale_after = chrono::Duration::seconds(cfg.reconcile_stale_after_secs);
    let interval = std::time::Duration::from_secs(cfg.reconcile_interval_secs.max(1));
    tracing::info!(
        interval_secs = cfg.reconcile_interval_secs,
        stale_after_secs = cfg.reconcile_stale_after_secs,
        batch = cfg.reconcile_batch,
        "payment reconciler started"
    );

    loop {
        match service.reconcile_stale(stale_after, cfg.reconcile_batch).await {
            Ok(summary) if summary.examined > 0 => tracing::info!(
                examined = summary.examined,
                changed = summary.changed,
                failed = summary.failed,
                "reconciliation pass finished"
            ),
            Ok(_) => {}
            // a database blip should not kill the worker
            Err(e) => tracing::error!("reconciliation pass failed: {}", e),
        }

        tokio::time::sleep(interval).await;
    }
}
