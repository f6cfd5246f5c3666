//! Kivu Orders worker - retry sweep daemon.
//!
//! Sweeps due failed registrations on an interval and re-attempts exactly
//! the failed domains. Order processing itself is driven by the host
//! application's queue runner through [`kivu_orders::jobs::handle_work_item`];
//! this binary is the durable backstop that guarantees every scheduled
//! retry eventually runs even when queue items are lost.
//!
//! # External services
//!
//! - `PostgreSQL` (orders, order items, failed registrations)
//! - Local registry EPP endpoint (HIGH PRIVILEGE credentials)
//! - Reseller registrar API (HIGH PRIVILEGE credentials)
//! - SMTP relay for notifications

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kivu_orders::config::OrdersConfig;
use kivu_orders::jobs::SweepOnlyQueue;
use kivu_orders::registrar::{EppClient, RegistrarRouter, ResellerClient};
use kivu_orders::services::{EmailNotifier, RetryService};
use kivu_orders::store::PgOrderStore;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &OrdersConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    // Load configuration from environment (needed for Sentry init)
    let config = OrdersConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Initialize tracing with EnvFilter.
    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kivu_orders=info".into());

    // Use JSON format on Fly.io for structured log parsing, text format locally
    let is_fly = std::env::var("FLY_APP_NAME").is_ok();
    let json_layer = is_fly.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_fly).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "worker failed");
        std::process::exit(1);
    }
}

async fn run(config: OrdersConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("connecting to database");
    let pool = kivu_orders::db::create_pool(&config.database_url).await?;

    let local = EppClient::new(config.epp.clone());
    let reseller = ResellerClient::new(config.reseller.clone())?;
    let router = Arc::new(RegistrarRouter::new(local, reseller));

    let notifier = Arc::new(EmailNotifier::new(&config.email)?);
    let store = Arc::new(PgOrderStore::new(pool));
    let queue = Arc::new(SweepOnlyQueue);

    let retry = RetryService::new(store, router, notifier, queue, config.retry);

    tracing::info!(
        interval_secs = config.sweep_interval.as_secs(),
        batch_size = config.sweep_batch_size,
        "retry worker started"
    );

    let mut ticker = tokio::time::interval(config.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match retry.run_due(config.sweep_batch_size).await {
                    Ok(summary) if summary.due > 0 => {
                        tracing::info!(?summary, "sweep complete");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        sentry::capture_error(&e);
                        tracing::error!(error = %e, "sweep failed");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
