//! Retry service: the periodic sweep and the single-record retry path.
//!
//! Safe under at-least-once delivery and multiple workers: a retry of a
//! terminal record is a no-op before any registrar call, and the store's
//! compare-and-set claim guarantees at most one in-flight attempt per
//! record - the loser of the claim performs zero registrar calls.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use kivu_core::{DomainName, FailedRegistrationId, OrderStatus};

use crate::error::AppError;
use crate::jobs::{JobQueue, WorkItem};
use crate::models::{FailedRegistration, RetryPolicy};
use crate::registrar::{RegistrarClient, RegistrationRequest, normalize_rejection};
use crate::store::OrderStore;

use super::notifications::{NotificationDispatcher, NotificationEvent, OrderSummary};

/// Outcome of one retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Terminal/exhausted record or lost claim; no registrar call made.
    Skipped,
    /// The retry registered the domain.
    Resolved {
        /// Whether this was the order's last outstanding failure and the
        /// order was promoted to `completed`.
        order_completed: bool,
    },
    /// The attempt failed; another retry is scheduled.
    Rescheduled,
    /// The attempt failed and exhausted the budget; a human takes over.
    Abandoned,
}

/// Tally of one sweep over the due records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Records selected as due.
    pub due: usize,
    /// Resolved this sweep.
    pub resolved: usize,
    /// Rescheduled for another attempt.
    pub rescheduled: usize,
    /// Abandoned this sweep.
    pub abandoned: usize,
    /// Skipped (terminal, exhausted, or lost claim).
    pub skipped: usize,
    /// Attempts that errored outside the registrar boundary.
    pub errors: usize,
}

/// Finds due failure records and re-attempts exactly the failed domain.
pub struct RetryService {
    store: Arc<dyn OrderStore>,
    registrar: Arc<dyn RegistrarClient>,
    notifier: Arc<dyn NotificationDispatcher>,
    queue: Arc<dyn JobQueue>,
    policy: RetryPolicy,
}

impl RetryService {
    /// Create a retry service.
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        registrar: Arc<dyn RegistrarClient>,
        notifier: Arc<dyn NotificationDispatcher>,
        queue: Arc<dyn JobQueue>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            registrar,
            notifier,
            queue,
            policy,
        }
    }

    /// Sweep the due records once.
    ///
    /// Records are independent; failures on one never stop the sweep.
    ///
    /// # Errors
    ///
    /// Returns error only if the due-record query itself fails.
    #[instrument(skip(self))]
    pub async fn run_due(&self, limit: i64) -> Result<SweepSummary, AppError> {
        let due = self.store.due_failures(Utc::now(), limit).await?;
        let mut summary = SweepSummary {
            due: due.len(),
            ..SweepSummary::default()
        };

        for record in due {
            match self.retry_one(record.id).await {
                Ok(RetryOutcome::Resolved { .. }) => summary.resolved += 1,
                Ok(RetryOutcome::Rescheduled) => summary.rescheduled += 1,
                Ok(RetryOutcome::Abandoned) => summary.abandoned += 1,
                Ok(RetryOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.errors += 1;
                    error!(failed_registration_id = %record.id, error = %e, "retry attempt errored");
                }
            }
        }

        if summary.due > 0 {
            info!(?summary, "retry sweep finished");
        }
        Ok(summary)
    }

    /// Retry one failure record.
    ///
    /// Used by both the sweep and the operator CLI; a manual trigger
    /// bypasses `next_retry_at` (this method never checks it) but not
    /// `can_retry()` - the attempt ceiling holds either way.
    ///
    /// # Errors
    ///
    /// Returns error for store faults; registrar failures are ordinary
    /// outcomes absorbed into the record's lifecycle.
    #[instrument(skip(self), fields(failed_registration_id = %id))]
    pub async fn retry_one(&self, id: FailedRegistrationId) -> Result<RetryOutcome, AppError> {
        let Some(record) = self.store.failed_registration(id).await? else {
            warn!("failure record does not exist");
            return Ok(RetryOutcome::Skipped);
        };

        // Idempotence guard: a resolved or abandoned record is a no-op
        // before any registrar call.
        if !record.can_retry() {
            debug!(
                status = %record.status,
                retry_count = record.retry_count,
                "record is not retryable; nothing to do"
            );
            return Ok(RetryOutcome::Skipped);
        }

        // Compare-and-set claim; losing means another worker is already
        // attempting this domain.
        let Some(claimed) = self.store.claim_for_retry(id).await? else {
            debug!("lost the claim race; skipping");
            return Ok(RetryOutcome::Skipped);
        };

        info!(
            domain = %claimed.domain_name,
            attempt = claimed.retry_count,
            max_retries = claimed.max_retries,
            "retrying domain registration"
        );

        match self.attempt(&claimed).await {
            Ok(handle) => self.apply_success(&claimed, &handle).await,
            Err(message) => self.apply_failure(&claimed, &message).await,
        }
    }

    /// One registrar attempt. Everything that can go wrong short of a
    /// store fault is reduced to a failure message here.
    async fn attempt(&self, record: &FailedRegistration) -> Result<String, String> {
        let domain = DomainName::parse(&record.domain_name)
            .map_err(|e| format!("invalid domain name: {e}"))?;

        // Snapshotted contacts, never a live lookup: the originals may have
        // been edited or deleted since the order was placed.
        let contacts = record
            .contacts()
            .map_err(|e| format!("contact snapshot unreadable: {e}"))?;

        let years = match self.store.order_item(record.order_item_id).await {
            Ok(item) => item.years,
            Err(e) => return Err(format!("order item unavailable: {e}")),
        };

        let request = RegistrationRequest {
            domain: domain.clone(),
            contacts,
            years,
            nameservers: Vec::new(),
        };

        match self.registrar.register_domain(&request).await {
            Ok(response) if response.success => {
                Ok(response.domain_id.unwrap_or_else(|| domain.to_string()))
            }
            Ok(response) => Err(normalize_rejection(&domain, &response.message)),
            Err(transport) => Err(transport.to_string()),
        }
    }

    async fn apply_success(
        &self,
        record: &FailedRegistration,
        handle: &str,
    ) -> Result<RetryOutcome, AppError> {
        self.store
            .mark_item_registered(record.order_item_id, handle)
            .await?;
        self.store.resolve(record.id).await?;

        info!(domain = %record.domain_name, handle = %handle, "retry succeeded");

        let promoted = self
            .store
            .complete_order_if_fulfilled(record.order_id)
            .await?;
        let order_completed = promoted == Some(OrderStatus::Completed);
        if order_completed {
            info!(order_id = %record.order_id, "all registrations completed for order");
        }

        Ok(RetryOutcome::Resolved { order_completed })
    }

    async fn apply_failure(
        &self,
        record: &FailedRegistration,
        message: &str,
    ) -> Result<RetryOutcome, AppError> {
        warn!(
            domain = %record.domain_name,
            attempt = record.retry_count,
            error = %message,
            "retry failed"
        );

        if record.retry_count >= record.max_retries {
            self.store.abandon(record.id, message).await?;
            self.notify_abandoned(record, message).await?;
            return Ok(RetryOutcome::Abandoned);
        }

        let next_retry_at = self.policy.next_retry_at(Utc::now());
        self.store
            .schedule_next_retry(record.id, message, next_retry_at)
            .await?;

        if let Err(e) = self
            .queue
            .enqueue(
                WorkItem::RetryFailedRegistration {
                    failed_registration_id: record.id,
                },
                Some(self.policy.backoff),
            )
            .await
        {
            warn!(error = %e, "could not enqueue next retry; the sweep will pick it up");
        }

        info!(
            domain = %record.domain_name,
            next_retry_at = %next_retry_at,
            "next retry scheduled"
        );
        Ok(RetryOutcome::Rescheduled)
    }

    async fn notify_abandoned(
        &self,
        record: &FailedRegistration,
        message: &str,
    ) -> Result<(), AppError> {
        let order = self.store.order_with_items(record.order_id).await?.order;
        let event = NotificationEvent::RegistrationAbandoned {
            order: OrderSummary {
                order_id: order.id,
                order_number: order.order_number.clone(),
                customer_email: order.customer_email.clone(),
            },
            domain: record.domain_name.clone(),
            retry_count: record.retry_count,
            failure_reason: message.to_owned(),
        };
        if let Err(e) = self.notifier.dispatch(event).await {
            error!(error = %e, "abandonment notification failed");
        }
        Ok(())
    }
}
