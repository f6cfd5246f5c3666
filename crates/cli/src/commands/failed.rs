//! Operator commands for failed domain registrations.
//!
//! `list` shows what is outstanding; `retry` dispatches retry attempts for
//! a selected set, gated by human confirmation. The retry path here is the
//! same one the sweep uses: the attempt ceiling (`can_retry`) cannot be
//! bypassed, only the schedule is.

use std::io::{BufRead, Write};
use std::sync::Arc;

use thiserror::Error;

use kivu_core::OrderId;
use kivu_orders::config::{ConfigError, OrdersConfig};
use kivu_orders::db::create_pool;
use kivu_orders::jobs::SweepOnlyQueue;
use kivu_orders::models::FailedRegistration;
use kivu_orders::registrar::{EppClient, RegistrarError, RegistrarRouter, ResellerClient};
use kivu_orders::services::{EmailNotifier, RetryOutcome, RetryService};
use kivu_orders::store::{OrderStore, PgOrderStore, StoreError};

/// Errors that can occur during failed-registration operations.
#[derive(Debug, Error)]
pub enum FailedCmdError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Registrar client could not be constructed.
    #[error("registrar error: {0}")]
    Registrar(#[from] RegistrarError),

    /// Notifier could not be constructed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Neither `--order` nor `--all` was given.
    #[error("specify either --order <ID> or --all")]
    NoSelection,
}

/// List retryable failed registrations, optionally for one order.
///
/// # Errors
///
/// Returns error if configuration or the database is unavailable.
pub async fn list(order: Option<i32>) -> Result<(), FailedCmdError> {
    dotenvy::dotenv().ok();
    let config = OrdersConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    let store = PgOrderStore::new(pool);

    let records = store
        .retryable_failures(order.map(OrderId::new))
        .await?;

    if records.is_empty() {
        #[allow(clippy::print_stdout)]
        {
            println!("No failed registrations found to retry.");
        }
        return Ok(());
    }

    print_table(&records);
    Ok(())
}

/// Retry failed registrations for a selected set, gated by confirmation.
///
/// Non-retryable records are skipped with a note; the summary reports
/// dispatched and skipped counts.
///
/// # Errors
///
/// Returns error if no selection was given or a backing service is
/// unavailable.
pub async fn retry(order: Option<i32>, all: bool, yes: bool) -> Result<(), FailedCmdError> {
    if order.is_none() && !all {
        return Err(FailedCmdError::NoSelection);
    }

    dotenvy::dotenv().ok();

    // The retry path opens EPP TLS sessions.
    rustls::crypto::ring::default_provider().install_default().ok();

    let config = OrdersConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    let store = Arc::new(PgOrderStore::new(pool));

    let records = store
        .retryable_failures(order.map(OrderId::new))
        .await?;

    if records.is_empty() {
        #[allow(clippy::print_stdout)]
        {
            println!("No failed registrations found to retry.");
        }
        return Ok(());
    }

    #[allow(clippy::print_stdout)]
    {
        println!("Found {} failed registration(s) to retry.", records.len());
    }
    print_table(&records);

    if !yes && !confirm("Dispatch retry attempts for these registrations?") {
        #[allow(clippy::print_stdout)]
        {
            println!("Operation cancelled.");
        }
        return Ok(());
    }

    let local = EppClient::new(config.epp.clone());
    let reseller = ResellerClient::new(config.reseller.clone())?;
    let router = Arc::new(RegistrarRouter::new(local, reseller));
    let notifier = Arc::new(EmailNotifier::new(&config.email)?);
    let retry_service = RetryService::new(
        store,
        router,
        notifier,
        Arc::new(SweepOnlyQueue),
        config.retry,
    );

    let mut dispatched = 0_usize;
    let mut skipped = 0_usize;

    for record in &records {
        if !record.can_retry() {
            #[allow(clippy::print_stdout)]
            {
                println!(
                    "Skipping {} - cannot retry (retry count: {}/{})",
                    record.domain_name, record.retry_count, record.max_retries
                );
            }
            skipped += 1;
            continue;
        }

        match retry_service.retry_one(record.id).await {
            Ok(RetryOutcome::Skipped) => {
                skipped += 1;
            }
            Ok(outcome) => {
                dispatched += 1;
                #[allow(clippy::print_stdout)]
                {
                    println!("Retried {} -> {:?}", record.domain_name, outcome);
                }
            }
            Err(e) => {
                skipped += 1;
                tracing::error!(
                    failed_registration_id = %record.id,
                    error = %e,
                    "retry dispatch failed"
                );
            }
        }
    }

    #[allow(clippy::print_stdout)]
    {
        println!();
        println!("Summary:");
        println!("  Dispatched: {dispatched}");
        println!("  Skipped: {skipped}");
    }
    Ok(())
}

fn print_table(records: &[FailedRegistration]) {
    #[allow(clippy::print_stdout)]
    {
        println!(
            "{:<6} {:<8} {:<30} {:<8} {:<10} {}",
            "ID", "Order", "Domain", "Retries", "Status", "Last Error"
        );
        for record in records {
            let mut reason: String = record.failure_reason.chars().take(50).collect();
            if record.failure_reason.chars().count() > 50 {
                reason.push_str("...");
            }
            println!(
                "{:<6} {:<8} {:<30} {:<8} {:<10} {}",
                record.id,
                record.order_id,
                record.domain_name,
                format!("{}/{}", record.retry_count, record.max_retries),
                record.status,
                reason
            );
        }
    }
}

fn confirm(question: &str) -> bool {
    #[allow(clippy::print_stdout)]
    {
        print!("{question} [y/N] ");
    }
    std::io::stdout().flush().ok();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
