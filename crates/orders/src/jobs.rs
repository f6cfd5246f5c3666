//! Work items scheduled onto the host application's job queue.
//!
//! The platform's job runner is external: an at-least-once queue with
//! optional delay. This module defines the two work-item kinds the
//! fulfillment core produces, the [`JobQueue`] seam it schedules them
//! through, and [`handle_work_item`] - the dispatch entry point the host
//! runner calls for each delivered item.
//!
//! Delivery is at-least-once, so every handler downstream is idempotent:
//! re-delivering a retry for a resolved record is a no-op, and
//! re-delivering order processing for a finished order is a no-op.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use kivu_core::{ContactSnapshot, FailedRegistrationId, OrderId};

use crate::error::AppError;
use crate::services::orchestrator::RegistrationOrchestrator;
use crate::services::retry::RetryService;

/// Errors that can occur when scheduling a work item.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue backend rejected or could not accept the item.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// One unit of work for the host queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItem {
    /// Drive domain registration for a freshly paid order.
    ProcessOrderRegistrations {
        /// The order to process.
        order_id: OrderId,
        /// Contact snapshot for every new registration in the order.
        contacts: ContactSnapshot,
    },
    /// Re-attempt one failed registration.
    RetryFailedRegistration {
        /// The failure record to retry.
        failed_registration_id: FailedRegistrationId,
    },
}

/// Scheduling seam into the host application's queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a work item, optionally delayed.
    async fn enqueue(&self, item: WorkItem, delay: Option<Duration>) -> Result<(), QueueError>;
}

/// Queue for deployments that rely solely on the periodic sweep.
///
/// `next_retry_at` on the failure record is the durable schedule; a
/// delayed queue item is only a latency optimization on top of it. This
/// implementation records the intent in the log and lets the sweep pick
/// the work up when it comes due.
pub struct SweepOnlyQueue;

#[async_trait]
impl JobQueue for SweepOnlyQueue {
    async fn enqueue(&self, item: WorkItem, delay: Option<Duration>) -> Result<(), QueueError> {
        debug!(?item, ?delay, "work item left to the periodic sweep");
        Ok(())
    }
}

/// Dispatch one delivered work item into the fulfillment services.
///
/// This is the entry point the host application's job runner calls.
///
/// # Errors
///
/// Returns error only for faults the services could not absorb themselves
/// (the orchestrator converts unexpected faults into `requires_attention`
/// before returning).
pub async fn handle_work_item(
    item: WorkItem,
    orchestrator: &RegistrationOrchestrator,
    retry: &RetryService,
) -> Result<(), AppError> {
    match item {
        WorkItem::ProcessOrderRegistrations { order_id, contacts } => {
            orchestrator.process_order(order_id, contacts).await?;
        }
        WorkItem::RetryFailedRegistration {
            failed_registration_id,
        } => {
            retry.retry_one(failed_registration_id).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kivu_core::ContactId;

    #[test]
    fn test_work_item_serde_round_trip() {
        let item = WorkItem::RetryFailedRegistration {
            failed_registration_id: FailedRegistrationId::new(9),
        };
        let json = serde_json::to_string(&item).expect("serialize");
        assert!(json.contains("retry_failed_registration"));
        let back: WorkItem = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(
            back,
            WorkItem::RetryFailedRegistration { failed_registration_id } if failed_registration_id == FailedRegistrationId::new(9)
        ));
    }

    #[test]
    fn test_process_order_item_shape() {
        let item = WorkItem::ProcessOrderRegistrations {
            order_id: OrderId::new(1),
            contacts: ContactSnapshot::single(ContactId::new(2)),
        };
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["kind"], "process_order_registrations");
        assert_eq!(json["order_id"], 1);
    }
}
