//! Database operations for orders and order items.

use sqlx::PgPool;

use kivu_core::{OrderId, OrderItemId, OrderStatus};

use crate::models::{Order, OrderItem, OrderWithItems};

use super::RepositoryError;

const ORDER_COLUMNS: &str = "id, order_number, user_id, customer_email, order_type, status, \
     currency_code, total_amount, notes, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, domain_name, years, price, currency_code, domain_id, metadata, created_at";

/// Get an order by ID.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn get_order(pool: &PgPool, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    Ok(order)
}

/// Get an order together with its line items.
///
/// # Errors
///
/// Returns error if either database query fails.
pub async fn get_order_with_items(
    pool: &PgPool,
    order_id: OrderId,
) -> Result<Option<OrderWithItems>, RepositoryError> {
    let Some(order) = get_order(pool, order_id).await? else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, OrderItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(OrderWithItems { order, items }))
}

/// Get a single order item.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn get_order_item(
    pool: &PgPool,
    item_id: OrderItemId,
) -> Result<Option<OrderItem>, RepositoryError> {
    let item = sqlx::query_as::<_, OrderItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE id = $1"
    ))
    .bind(item_id)
    .fetch_optional(pool)
    .await?;

    Ok(item)
}

/// Move an in-flight order into `processing`.
///
/// Guarded so a completed/terminal order is never dragged back; returns
/// whether a row was updated.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn begin_processing(pool: &PgPool, order_id: OrderId) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE orders
        SET status = 'processing', updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'processing')
        ",
    )
    .bind(order_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record the orchestrator's aggregate outcome for an order.
///
/// Only valid from `processing`; returns whether a row was updated.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn finish_processing(
    pool: &PgPool,
    order_id: OrderId,
    outcome: OrderStatus,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE orders
        SET status = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        ",
    )
    .bind(order_id)
    .bind(outcome)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Force an order into `requires_attention` (unexpected-fault escape hatch).
///
/// Reachable from any in-flight state.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn mark_requires_attention(
    pool: &PgPool,
    order_id: OrderId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE orders
        SET status = 'requires_attention', updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'processing')
        ",
    )
    .bind(order_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Append a line to the order's operational notes.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn append_note(
    pool: &PgPool,
    order_id: OrderId,
    note: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE orders
        SET notes = COALESCE(notes || E'\n', '') || $2, updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(order_id)
    .bind(note)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record the provider domain handle on a successfully registered item.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn mark_item_registered(
    pool: &PgPool,
    item_id: OrderItemId,
    domain_id: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE order_items
        SET domain_id = $2
        WHERE id = $1
        ",
    )
    .bind(item_id)
    .bind(domain_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Promote an order to `completed` once its last outstanding failure is gone.
///
/// Concurrent resolutions of different failure records race here, so the
/// order row is taken `FOR UPDATE` and the outstanding count is read inside
/// the same transaction. Returns the new status when a promotion happened.
///
/// # Errors
///
/// Returns error if the transaction fails.
pub async fn complete_order_if_fulfilled(
    pool: &PgPool,
    order_id: OrderId,
) -> Result<Option<OrderStatus>, RepositoryError> {
    let mut tx = pool.begin().await?;

    let status: Option<OrderStatus> =
        sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;

    let Some(status) = status else {
        tx.rollback().await?;
        return Err(RepositoryError::NotFound);
    };

    if !matches!(
        status,
        OrderStatus::PartiallyCompleted | OrderStatus::Failed
    ) {
        tx.rollback().await?;
        return Ok(None);
    }

    let outstanding: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*) FROM failed_registrations
        WHERE order_id = $1 AND status IN ('pending', 'retrying')
        ",
    )
    .bind(order_id)
    .fetch_one(&mut *tx)
    .await?;

    if outstanding > 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    sqlx::query(
        r"
        UPDATE orders
        SET status = 'completed', updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(OrderStatus::Completed))
}
