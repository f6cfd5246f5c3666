//! Database operations for failed registration records.
//!
//! The state machine (`pending → retrying → {resolved | abandoned}`) is
//! enforced here with conditional updates: every transition names the
//! states it is valid from, so a concurrent worker that lost the race
//! simply updates zero rows. [`claim_for_retry`] is the compare-and-set
//! that serializes retry attempts per record.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use kivu_core::{FailedRegistrationId, OrderId};

use crate::models::{FailedRegistration, NewFailedRegistration};

use super::RepositoryError;

const COLUMNS: &str = "id, order_id, order_item_id, domain_name, status, retry_count, \
     max_retries, failure_reason, contact_ids, last_attempted_at, next_retry_at, \
     resolved_at, created_at, updated_at";

/// Record a registration failure for an order item.
///
/// At most one record exists per item; re-recording a failure for the same
/// item (at-least-once job delivery) refreshes the reason and schedule
/// instead of inserting a duplicate.
///
/// # Errors
///
/// Returns error if the database insert fails or the contact snapshot
/// cannot be serialized.
pub async fn record_failure(
    pool: &PgPool,
    params: NewFailedRegistration,
) -> Result<FailedRegistration, RepositoryError> {
    let contact_ids = serde_json::to_value(params.contacts)
        .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;

    let record = sqlx::query_as::<_, FailedRegistration>(&format!(
        r"
        INSERT INTO failed_registrations (
            order_id, order_item_id, domain_name, failure_reason,
            contact_ids, max_retries, last_attempted_at, next_retry_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, NOW(), $7)
        ON CONFLICT (order_item_id) DO UPDATE
        SET failure_reason = EXCLUDED.failure_reason,
            last_attempted_at = NOW(),
            next_retry_at = EXCLUDED.next_retry_at,
            updated_at = NOW()
        RETURNING {COLUMNS}
        "
    ))
    .bind(params.order_id)
    .bind(params.order_item_id)
    .bind(&params.domain_name)
    .bind(&params.failure_reason)
    .bind(contact_ids)
    .bind(params.max_retries)
    .bind(params.next_retry_at)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Get a failed registration by ID.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn get(
    pool: &PgPool,
    id: FailedRegistrationId,
) -> Result<Option<FailedRegistration>, RepositoryError> {
    let record = sqlx::query_as::<_, FailedRegistration>(&format!(
        "SELECT {COLUMNS} FROM failed_registrations WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// How long a claim blocks competing attempts on the same record.
///
/// Registrar calls time out well inside this window, so an expired lease
/// means the claiming worker died mid-attempt and the record may be
/// claimed again (the attempt it charged stays charged).
pub const ATTEMPT_LEASE_SECS: i64 = 600;

/// Atomically claim a record for one retry attempt.
///
/// Compare-and-set: moves the record into `retrying`, charges one attempt
/// against the budget, stamps `last_attempted_at`, and clears
/// `next_retry_at` - a retrying record with no schedule is the in-flight
/// marker, and a competing claim against it inside [`ATTEMPT_LEASE_SECS`]
/// updates zero rows. Returns `None` when the record is terminal,
/// exhausted, or another worker holds the claim; the caller must then
/// perform no registrar call. A worker crash between claim and outcome
/// leaves the record recoverable: [`due`] picks up stale in-flight claims
/// once the lease expires.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn claim_for_retry(
    pool: &PgPool,
    id: FailedRegistrationId,
) -> Result<Option<FailedRegistration>, RepositoryError> {
    let record = sqlx::query_as::<_, FailedRegistration>(&format!(
        r"
        UPDATE failed_registrations
        SET status = 'retrying',
            retry_count = retry_count + 1,
            last_attempted_at = NOW(),
            next_retry_at = NULL,
            updated_at = NOW()
        WHERE id = $1
          AND status IN ('pending', 'retrying')
          AND retry_count < max_retries
          AND NOT (
                status = 'retrying'
                AND next_retry_at IS NULL
                AND last_attempted_at IS NOT NULL
                AND last_attempted_at > NOW() - make_interval(secs => $2::double precision)
          )
        RETURNING {COLUMNS}
        "
    ))
    .bind(id)
    .bind(ATTEMPT_LEASE_SECS)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Record a failed attempt and schedule the next one.
///
/// Only valid while `retrying` (i.e. after a successful claim).
///
/// # Errors
///
/// Returns error if the database update fails or the record is not in a
/// claimable state.
pub async fn schedule_next_retry(
    pool: &PgPool,
    id: FailedRegistrationId,
    reason: &str,
    next_retry_at: DateTime<Utc>,
) -> Result<FailedRegistration, RepositoryError> {
    let record = sqlx::query_as::<_, FailedRegistration>(&format!(
        r"
        UPDATE failed_registrations
        SET failure_reason = $2, next_retry_at = $3, updated_at = NOW()
        WHERE id = $1 AND status = 'retrying'
        RETURNING {COLUMNS}
        "
    ))
    .bind(id)
    .bind(reason)
    .bind(next_retry_at)
    .fetch_optional(pool)
    .await?;

    record.ok_or(RepositoryError::NotFound)
}

/// Mark a record abandoned after its retry budget is exhausted.
///
/// Terminal; nothing will touch the record again.
///
/// # Errors
///
/// Returns error if the database update fails or the record is already
/// terminal.
pub async fn abandon(
    pool: &PgPool,
    id: FailedRegistrationId,
    reason: &str,
) -> Result<FailedRegistration, RepositoryError> {
    let record = sqlx::query_as::<_, FailedRegistration>(&format!(
        r"
        UPDATE failed_registrations
        SET status = 'abandoned', failure_reason = $2, next_retry_at = NULL,
            updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'retrying')
        RETURNING {COLUMNS}
        "
    ))
    .bind(id)
    .bind(reason)
    .fetch_optional(pool)
    .await?;

    record.ok_or(RepositoryError::NotFound)
}

/// Mark a record resolved: a retry eventually registered the domain.
///
/// # Errors
///
/// Returns error if the database update fails or the record is already
/// terminal.
pub async fn resolve(
    pool: &PgPool,
    id: FailedRegistrationId,
) -> Result<FailedRegistration, RepositoryError> {
    let record = sqlx::query_as::<_, FailedRegistration>(&format!(
        r"
        UPDATE failed_registrations
        SET status = 'resolved', resolved_at = NOW(), next_retry_at = NULL,
            updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'retrying')
        RETURNING {COLUMNS}
        "
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    record.ok_or(RepositoryError::NotFound)
}

/// Records due for a retry at `now`, oldest first.
///
/// The sweep's selection predicate: retryable status, budget left, and a
/// schedule that has come due. Stale in-flight claims (a worker died
/// between claim and outcome) are also selected once their lease expires,
/// so no record is ever stranded in `retrying`.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn due(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<FailedRegistration>, RepositoryError> {
    let records = sqlx::query_as::<_, FailedRegistration>(&format!(
        r"
        SELECT {COLUMNS} FROM failed_registrations
        WHERE status IN ('pending', 'retrying')
          AND retry_count < max_retries
          AND (
                (next_retry_at IS NOT NULL AND next_retry_at <= $1)
                OR (status = 'retrying' AND next_retry_at IS NULL
                    AND last_attempted_at < $1 - make_interval(secs => $3::double precision))
          )
        ORDER BY next_retry_at NULLS FIRST
        LIMIT $2
        "
    ))
    .bind(now)
    .bind(limit)
    .bind(ATTEMPT_LEASE_SECS)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Count an order's unresolved failures.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn outstanding_for_order(
    pool: &PgPool,
    order_id: OrderId,
) -> Result<i64, RepositoryError> {
    let count: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*) FROM failed_registrations
        WHERE order_id = $1 AND status IN ('pending', 'retrying')
        ",
    )
    .bind(order_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// List retryable records, optionally restricted to one order.
///
/// Used by the operator CLI.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn list_retryable(
    pool: &PgPool,
    order_id: Option<OrderId>,
) -> Result<Vec<FailedRegistration>, RepositoryError> {
    let records = sqlx::query_as::<_, FailedRegistration>(&format!(
        r"
        SELECT {COLUMNS} FROM failed_registrations
        WHERE status IN ('pending', 'retrying')
          AND ($1::integer IS NULL OR order_id = $1)
        ORDER BY created_at
        "
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}
