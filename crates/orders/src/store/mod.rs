//! The `OrderStore` capability.
//!
//! The orchestrator and retry service never touch SQL directly; they speak
//! this trait. Production uses [`PgOrderStore`] over the `db` modules; the
//! integration-test harness substitutes an in-memory implementation with
//! the same compare-and-set semantics.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use kivu_core::{FailedRegistrationId, OrderId, OrderItemId, OrderStatus};

use crate::db::RepositoryError;
use crate::models::{FailedRegistration, NewFailedRegistration, OrderItem, OrderWithItems};

pub use postgres::PgOrderStore;

/// Errors from the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Order does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Order item does not exist.
    #[error("order item {0} not found")]
    OrderItemNotFound(OrderItemId),

    /// Failed registration record does not exist.
    #[error("failed registration {0} not found")]
    FailureNotFound(FailedRegistrationId),

    /// A lifecycle method was called from an illegal state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Underlying repository error.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Persistence capability for orders, items, and failed registrations.
///
/// All writes go through these lifecycle methods so the state-machine
/// invariants (monotonic statuses, retry budget, per-record attempt
/// serialization) hold no matter how many workers run concurrently.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Load an order with its line items.
    async fn order_with_items(&self, order_id: OrderId) -> Result<OrderWithItems, StoreError>;

    /// Load a single order item.
    async fn order_item(&self, item_id: OrderItemId) -> Result<OrderItem, StoreError>;

    /// Move an in-flight order into `processing`. Returns `false` when the
    /// order is already terminal (the caller must then do nothing).
    async fn begin_processing(&self, order_id: OrderId) -> Result<bool, StoreError>;

    /// Record the orchestrator's aggregate outcome (from `processing` only).
    async fn finish_processing(
        &self,
        order_id: OrderId,
        outcome: OrderStatus,
    ) -> Result<(), StoreError>;

    /// Unexpected-fault escape hatch: force `requires_attention` and append
    /// the fault text to the order's notes.
    async fn mark_requires_attention(&self, order_id: OrderId, note: &str)
    -> Result<(), StoreError>;

    /// Record the provider handle on a successfully registered item.
    async fn mark_item_registered(
        &self,
        item_id: OrderItemId,
        domain_id: &str,
    ) -> Result<(), StoreError>;

    /// Record a registration failure (insert-or-refresh per order item).
    async fn record_failure(
        &self,
        params: NewFailedRegistration,
    ) -> Result<FailedRegistration, StoreError>;

    /// Load a failed registration record.
    async fn failed_registration(
        &self,
        id: FailedRegistrationId,
    ) -> Result<Option<FailedRegistration>, StoreError>;

    /// Compare-and-set claim for one retry attempt; `None` means the
    /// caller lost (terminal, exhausted, or another worker holds it) and
    /// must not call the registrar.
    async fn claim_for_retry(
        &self,
        id: FailedRegistrationId,
    ) -> Result<Option<FailedRegistration>, StoreError>;

    /// Record a failed attempt and when the next one is due.
    async fn schedule_next_retry(
        &self,
        id: FailedRegistrationId,
        reason: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<FailedRegistration, StoreError>;

    /// Terminal: retry budget exhausted, needs a human.
    async fn abandon(
        &self,
        id: FailedRegistrationId,
        reason: &str,
    ) -> Result<FailedRegistration, StoreError>;

    /// Terminal: a retry registered the domain.
    async fn resolve(&self, id: FailedRegistrationId) -> Result<FailedRegistration, StoreError>;

    /// Records due for a retry at `now`, oldest first.
    async fn due_failures(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FailedRegistration>, StoreError>;

    /// Retryable records, optionally restricted to one order (operator CLI).
    async fn retryable_failures(
        &self,
        order_id: Option<OrderId>,
    ) -> Result<Vec<FailedRegistration>, StoreError>;

    /// Promote the order to `completed` once no failures are outstanding.
    /// Serialized per order; returns the new status when a promotion
    /// happened.
    async fn complete_order_if_fulfilled(
        &self,
        order_id: OrderId,
    ) -> Result<Option<OrderStatus>, StoreError>;
}
