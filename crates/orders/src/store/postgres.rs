//! `PostgreSQL` implementation of the order store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use kivu_core::{FailedRegistrationId, OrderId, OrderItemId, OrderStatus};

use crate::db::{failed_registrations, orders};
use crate::models::{FailedRegistration, NewFailedRegistration, OrderItem, OrderWithItems};

use super::{OrderStore, StoreError};

/// Order store backed by the `db` modules.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn order_with_items(&self, order_id: OrderId) -> Result<OrderWithItems, StoreError> {
        orders::get_order_with_items(&self.pool, order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))
    }

    async fn order_item(&self, item_id: OrderItemId) -> Result<OrderItem, StoreError> {
        orders::get_order_item(&self.pool, item_id)
            .await?
            .ok_or(StoreError::OrderItemNotFound(item_id))
    }

    async fn begin_processing(&self, order_id: OrderId) -> Result<bool, StoreError> {
        Ok(orders::begin_processing(&self.pool, order_id).await?)
    }

    async fn finish_processing(
        &self,
        order_id: OrderId,
        outcome: OrderStatus,
    ) -> Result<(), StoreError> {
        let updated = orders::finish_processing(&self.pool, order_id, outcome).await?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::InvalidState(format!(
                "order {order_id} was not in processing"
            )))
        }
    }

    async fn mark_requires_attention(
        &self,
        order_id: OrderId,
        note: &str,
    ) -> Result<(), StoreError> {
        orders::mark_requires_attention(&self.pool, order_id).await?;
        orders::append_note(&self.pool, order_id, note).await?;
        Ok(())
    }

    async fn mark_item_registered(
        &self,
        item_id: OrderItemId,
        domain_id: &str,
    ) -> Result<(), StoreError> {
        Ok(orders::mark_item_registered(&self.pool, item_id, domain_id).await?)
    }

    async fn record_failure(
        &self,
        params: NewFailedRegistration,
    ) -> Result<FailedRegistration, StoreError> {
        Ok(failed_registrations::record_failure(&self.pool, params).await?)
    }

    async fn failed_registration(
        &self,
        id: FailedRegistrationId,
    ) -> Result<Option<FailedRegistration>, StoreError> {
        Ok(failed_registrations::get(&self.pool, id).await?)
    }

    async fn claim_for_retry(
        &self,
        id: FailedRegistrationId,
    ) -> Result<Option<FailedRegistration>, StoreError> {
        Ok(failed_registrations::claim_for_retry(&self.pool, id).await?)
    }

    async fn schedule_next_retry(
        &self,
        id: FailedRegistrationId,
        reason: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<FailedRegistration, StoreError> {
        Ok(failed_registrations::schedule_next_retry(&self.pool, id, reason, next_retry_at).await?)
    }

    async fn abandon(
        &self,
        id: FailedRegistrationId,
        reason: &str,
    ) -> Result<FailedRegistration, StoreError> {
        Ok(failed_registrations::abandon(&self.pool, id, reason).await?)
    }

    async fn resolve(&self, id: FailedRegistrationId) -> Result<FailedRegistration, StoreError> {
        Ok(failed_registrations::resolve(&self.pool, id).await?)
    }

    async fn due_failures(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FailedRegistration>, StoreError> {
        Ok(failed_registrations::due(&self.pool, now, limit).await?)
    }

    async fn retryable_failures(
        &self,
        order_id: Option<OrderId>,
    ) -> Result<Vec<FailedRegistration>, StoreError> {
        Ok(failed_registrations::list_retryable(&self.pool, order_id).await?)
    }

    async fn complete_order_if_fulfilled(
        &self,
        order_id: OrderId,
    ) -> Result<Option<OrderStatus>, StoreError> {
        Ok(orders::complete_order_if_fulfilled(&self.pool, order_id).await?)
    }
}
