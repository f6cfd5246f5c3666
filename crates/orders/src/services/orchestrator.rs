//! Registration orchestrator: drives every line item of a paid order
//! through the registrar and classifies the aggregate outcome.
//!
//! Processing is strictly sequential within one order - registrar accounts
//! are rate-limited per account, and a deterministic successful/failed
//! partition makes the logs reconstructible. Ordinary registrar failures
//! (rejections, timeouts) are absorbed at the item boundary into failure
//! records; only faults outside that boundary reach the order-level
//! handler, which parks the order in `requires_attention` for a human.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use kivu_core::{ContactSnapshot, DomainName, OrderId, OrderStatus, OrderType};

use crate::error::AppError;
use crate::jobs::{JobQueue, WorkItem};
use crate::models::{NewFailedRegistration, Order, OrderItem, RetryPolicy};
use crate::registrar::{
    RegistrarClient, RegistrationRequest, normalize_rejection,
};
use crate::store::OrderStore;

use super::notifications::{
    FailedDomain, NotificationDispatcher, NotificationEvent, OrderSummary,
};

/// Aggregate outcome of one `process_order` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Every item fulfilled.
    Completed,
    /// Some items fulfilled; failures are tracked for retry.
    PartiallyCompleted,
    /// Every item failed; failures are tracked for retry.
    Failed,
    /// Unexpected fault; the order is parked for a human.
    RequiresAttention,
    /// The order was already terminal; nothing was attempted.
    AlreadyFinished,
    /// Order type is fulfilled by the host application, not this engine.
    Delegated,
}

/// Drives domain registration for paid orders.
pub struct RegistrationOrchestrator {
    store: Arc<dyn OrderStore>,
    registrar: Arc<dyn RegistrarClient>,
    notifier: Arc<dyn NotificationDispatcher>,
    queue: Arc<dyn JobQueue>,
    policy: RetryPolicy,
    default_nameservers: Vec<String>,
}

enum ItemOutcome {
    Registered { domain: String },
    Failed { domain: String, message: String },
}

impl RegistrationOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        registrar: Arc<dyn RegistrarClient>,
        notifier: Arc<dyn NotificationDispatcher>,
        queue: Arc<dyn JobQueue>,
        policy: RetryPolicy,
        default_nameservers: Vec<String>,
    ) -> Self {
        Self {
            store,
            registrar,
            notifier,
            queue,
            policy,
            default_nameservers,
        }
    }

    /// Process a paid order end to end.
    ///
    /// Marks the order `processing` before the first registrar call so a
    /// crash mid-run is visible and recoverable rather than silently
    /// re-attempted from `pending`. Never returns `Err` for conditions the
    /// retry machinery handles; an `Err` from the inner run is converted
    /// into the `requires_attention` escape hatch here.
    ///
    /// # Errors
    ///
    /// Returns error only if the order cannot be loaded at all.
    #[instrument(skip(self, contacts), fields(order_id = %order_id))]
    pub async fn process_order(
        &self,
        order_id: OrderId,
        contacts: ContactSnapshot,
    ) -> Result<ProcessOutcome, AppError> {
        let loaded = self.store.order_with_items(order_id).await?;
        let order = loaded.order;

        if !order.status.is_in_flight() {
            warn!(status = %order.status, "order is not in flight; nothing to do");
            return Ok(ProcessOutcome::AlreadyFinished);
        }
        if !self.store.begin_processing(order_id).await? {
            warn!("lost the race to begin processing");
            return Ok(ProcessOutcome::AlreadyFinished);
        }

        match self.run(&order, &loaded.items, contacts).await {
            Ok(outcome) => Ok(outcome),
            Err(fault) => {
                // Unexpected fault: not a registrar rejection, something the
                // retry mechanism cannot reason about.
                sentry::capture_error(&fault);
                error!(error = %fault, "order processing failed outside the item boundary");

                let note = format!("Payment succeeded but processing failed: {fault}");
                if let Err(store_err) = self
                    .store
                    .mark_requires_attention(order_id, &note)
                    .await
                {
                    error!(error = %store_err, "could not park order in requires_attention");
                }

                self.dispatch(NotificationEvent::CriticalOrderFailure {
                    order: summary(&order),
                    error: fault.to_string(),
                })
                .await;

                Ok(ProcessOutcome::RequiresAttention)
            }
        }
    }

    async fn run(
        &self,
        order: &Order,
        items: &[OrderItem],
        contacts: ContactSnapshot,
    ) -> Result<ProcessOutcome, AppError> {
        match order.order_type {
            OrderType::Hosting => {
                // No registrar work on hosting-only orders.
                info!("hosting-only order, completing immediately");
                self.store
                    .finish_processing(order.id, OrderStatus::Completed)
                    .await?;
                Ok(ProcessOutcome::Completed)
            }
            OrderType::Registration => self.register_items(order, items, contacts).await,
            OrderType::Renewal => self.renew_items(order, items).await,
            OrderType::Transfer | OrderType::SubscriptionRenewal => {
                // Transfers and subscription renewals are fulfilled by the
                // host application's own jobs; it finishes the order.
                info!(order_type = %order.order_type, "order delegated to the host application");
                Ok(ProcessOutcome::Delegated)
            }
        }
    }

    async fn register_items(
        &self,
        order: &Order,
        items: &[OrderItem],
        contacts: ContactSnapshot,
    ) -> Result<ProcessOutcome, AppError> {
        let mut successful: Vec<String> = Vec::new();
        let mut failed: Vec<FailedDomain> = Vec::new();

        info!(item_count = items.len(), "starting domain registration");

        for item in items {
            if item
                .metadata
                .get("kind")
                .and_then(serde_json::Value::as_str)
                == Some("hosting")
            {
                continue;
            }

            match self.register_item(order, item, contacts).await? {
                ItemOutcome::Registered { domain } => successful.push(domain),
                ItemOutcome::Failed { domain, message } => {
                    failed.push(FailedDomain { domain, message });
                }
            }
        }

        let outcome = if failed.is_empty() {
            self.store
                .finish_processing(order.id, OrderStatus::Completed)
                .await?;
            info!(registered = successful.len(), "all domains registered");
            self.dispatch(NotificationEvent::OrderConfirmation {
                order: summary(order),
                domains: successful,
            })
            .await;
            ProcessOutcome::Completed
        } else if successful.is_empty() {
            self.store
                .finish_processing(order.id, OrderStatus::Failed)
                .await?;
            warn!(failed = failed.len(), "all domains failed to register");
            self.dispatch(NotificationEvent::FullRegistrationFailure {
                order: summary(order),
                failed,
            })
            .await;
            ProcessOutcome::Failed
        } else {
            self.store
                .finish_processing(order.id, OrderStatus::PartiallyCompleted)
                .await?;
            warn!(
                registered = successful.len(),
                failed = failed.len(),
                "some domains failed to register"
            );
            self.dispatch(NotificationEvent::PartialRegistrationFailure {
                order: summary(order),
                successful,
                failed,
            })
            .await;
            ProcessOutcome::PartiallyCompleted
        };

        Ok(outcome)
    }

    /// Register one item. Registrar rejections and transport failures are
    /// ordinary outcomes here and never abort the sibling items; only
    /// store faults propagate.
    async fn register_item(
        &self,
        order: &Order,
        item: &OrderItem,
        contacts: ContactSnapshot,
    ) -> Result<ItemOutcome, AppError> {
        let domain = match DomainName::parse(&item.domain_name) {
            Ok(domain) => domain,
            Err(e) => {
                // Unroutable name; permanent, but the bounded retry budget
                // caps the cost and abandonment surfaces it.
                let message = format!("invalid domain name: {e}");
                self.record_failure(order, item, &item.domain_name, &message, contacts)
                    .await?;
                return Ok(ItemOutcome::Failed {
                    domain: item.domain_name.clone(),
                    message,
                });
            }
        };

        info!(domain = %domain, years = item.years, "attempting registration");

        let request = RegistrationRequest {
            domain: domain.clone(),
            contacts,
            years: item.years,
            nameservers: Vec::new(),
        };

        match self.registrar.register_domain(&request).await {
            Ok(response) if response.success => {
                let handle = response
                    .domain_id
                    .unwrap_or_else(|| domain.to_string());
                self.store.mark_item_registered(item.id, &handle).await?;
                self.apply_default_nameservers(&domain).await;
                info!(domain = %domain, handle = %handle, "domain registered");
                Ok(ItemOutcome::Registered {
                    domain: domain.to_string(),
                })
            }
            Ok(response) => {
                let message = normalize_rejection(&domain, &response.message);
                error!(domain = %domain, error = %message, "registration rejected");
                self.record_failure(order, item, domain.as_str(), &message, contacts)
                    .await?;
                Ok(ItemOutcome::Failed {
                    domain: domain.to_string(),
                    message,
                })
            }
            Err(transport) => {
                // Timeouts included: an abort gives no guarantee about the
                // registrar side, so this enters the same retry path.
                let message = transport.to_string();
                error!(domain = %domain, error = %message, "registration attempt errored");
                self.record_failure(order, item, domain.as_str(), &message, contacts)
                    .await?;
                Ok(ItemOutcome::Failed {
                    domain: domain.to_string(),
                    message,
                })
            }
        }
    }

    /// Renewal orders reuse the same classification but renew instead of
    /// create. Renewal failures are surfaced to admins, not entered into
    /// the per-domain retry path: a failed renewal of a live domain is an
    /// operator decision, not something to hammer automatically.
    async fn renew_items(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<ProcessOutcome, AppError> {
        let mut successful: Vec<String> = Vec::new();
        let mut failed: Vec<FailedDomain> = Vec::new();

        for item in items {
            let domain = match DomainName::parse(&item.domain_name) {
                Ok(domain) => domain,
                Err(e) => {
                    failed.push(FailedDomain {
                        domain: item.domain_name.clone(),
                        message: format!("invalid domain name: {e}"),
                    });
                    continue;
                }
            };

            match self.registrar.renew_domain(&domain, item.years).await {
                Ok(response) if response.success => successful.push(domain.to_string()),
                Ok(response) => failed.push(FailedDomain {
                    domain: domain.to_string(),
                    message: response.message,
                }),
                Err(e) => failed.push(FailedDomain {
                    domain: domain.to_string(),
                    message: e.to_string(),
                }),
            }
        }

        let outcome = if failed.is_empty() {
            self.store
                .finish_processing(order.id, OrderStatus::Completed)
                .await?;
            ProcessOutcome::Completed
        } else if successful.is_empty() {
            self.store
                .finish_processing(order.id, OrderStatus::Failed)
                .await?;
            self.dispatch(NotificationEvent::FullRegistrationFailure {
                order: summary(order),
                failed,
            })
            .await;
            ProcessOutcome::Failed
        } else {
            self.store
                .finish_processing(order.id, OrderStatus::PartiallyCompleted)
                .await?;
            self.dispatch(NotificationEvent::PartialRegistrationFailure {
                order: summary(order),
                successful,
                failed,
            })
            .await;
            ProcessOutcome::PartiallyCompleted
        };

        Ok(outcome)
    }

    async fn record_failure(
        &self,
        order: &Order,
        item: &OrderItem,
        domain: &str,
        message: &str,
        contacts: ContactSnapshot,
    ) -> Result<(), AppError> {
        let next_retry_at = self.policy.next_retry_at(chrono::Utc::now());
        let record = self
            .store
            .record_failure(NewFailedRegistration {
                order_id: order.id,
                order_item_id: item.id,
                domain_name: domain.to_owned(),
                failure_reason: message.to_owned(),
                contacts,
                max_retries: self.policy.max_retries,
                next_retry_at,
            })
            .await?;

        // The durable schedule is next_retry_at; the queue item only buys
        // latency, so a scheduling failure is not a processing failure.
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
            warn!(error = %e, failed_registration_id = %record.id, "could not enqueue retry");
        }

        info!(
            failed_registration_id = %record.id,
            domain = %domain,
            next_retry_at = %next_retry_at,
            "failure recorded, retry scheduled"
        );
        Ok(())
    }

    /// Post-registration nameserver follow-up. A failure here does not
    /// fail the registration; the domain exists either way.
    async fn apply_default_nameservers(&self, domain: &DomainName) {
        if self.default_nameservers.is_empty() {
            return;
        }
        match self
            .registrar
            .update_nameservers(domain, &self.default_nameservers)
            .await
        {
            Ok(response) if !response.success => {
                warn!(domain = %domain, error = %response.message, "nameserver update rejected after registration");
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, "nameserver update failed after registration");
            }
            Ok(_) => {}
        }
    }

    async fn dispatch(&self, event: NotificationEvent) {
        if let Err(e) = self.notifier.dispatch(event).await {
            error!(error = %e, "notification delivery failed");
        }
    }
}

fn summary(order: &Order) -> OrderSummary {
    OrderSummary {
        order_id: order.id,
        order_number: order.order_number.clone(),
        customer_email: order.customer_email.clone(),
    }
}
