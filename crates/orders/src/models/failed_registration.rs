//! Failed registration record and retry policy.
//!
//! A failed registration tracks one order item whose registrar-side
//! registration did not go through, together with its retry history. The
//! state machine is `pending → retrying → {resolved | abandoned}` and all
//! transitions go through the store's lifecycle methods, which enforce the
//! retry budget with conditional updates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kivu_core::{ContactSnapshot, FailedRegistrationId, FailureStatus, OrderId, OrderItemId};

/// Retry policy for failed registrations.
///
/// Fixed backoff rather than exponential: registrar-side transient failures
/// (rate limiting, temporary registry unavailability) typically clear
/// within a bounded window, and a bounded total wait keeps customer-facing
/// uncertainty short. One global policy; tunable via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt ceiling. A record whose count reaches this is abandoned.
    pub max_retries: i32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// When the next attempt should run, measured from `now`.
    #[must_use]
    pub fn next_retry_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.backoff).unwrap_or_else(|_| chrono::Duration::hours(1))
    }
}

/// One outstanding registration failure tied to one order line item.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FailedRegistration {
    /// Unique record ID.
    pub id: FailedRegistrationId,
    /// Order the failed item belongs to.
    pub order_id: OrderId,
    /// The specific line item that failed.
    pub order_item_id: OrderItemId,
    /// Domain that failed to register.
    pub domain_name: String,
    /// Lifecycle status.
    pub status: FailureStatus,
    /// Attempts made so far.
    pub retry_count: i32,
    /// Attempt ceiling for this record.
    pub max_retries: i32,
    /// Last error text from the registrar.
    pub failure_reason: String,
    /// Contact snapshot taken at first failure (JSONB).
    pub contact_ids: serde_json::Value,
    /// When the last attempt was made.
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// When the next attempt is due.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When the registration eventually succeeded.
    pub resolved_at: Option<DateTime<Utc>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl FailedRegistration {
    /// Whether another attempt is allowed.
    ///
    /// True iff the record is not terminal and the retry budget is not
    /// exhausted. Manual operator retries go through the same check; the
    /// attempt ceiling cannot be bypassed.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.retry_count < self.max_retries
    }

    /// Whether the record is due at `now` (scheduled sweep predicate).
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.can_retry() && self.next_retry_at.is_none_or(|at| at <= now)
    }

    /// The contact snapshot persisted with this record.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the stored JSON does not match
    /// the snapshot shape (data corruption).
    pub fn contacts(&self) -> Result<ContactSnapshot, serde_json::Error> {
        serde_json::from_value(self.contact_ids.clone())
    }
}

/// Parameters for recording a new failure.
#[derive(Debug, Clone)]
pub struct NewFailedRegistration {
    /// Order the failed item belongs to.
    pub order_id: OrderId,
    /// The line item that failed.
    pub order_item_id: OrderItemId,
    /// Domain that failed to register.
    pub domain_name: String,
    /// Error text from the registrar.
    pub failure_reason: String,
    /// Contact snapshot to persist for retries.
    pub contacts: ContactSnapshot,
    /// Attempt ceiling.
    pub max_retries: i32,
    /// When the first retry is due.
    pub next_retry_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kivu_core::ContactId;

    fn record(status: FailureStatus, retry_count: i32) -> FailedRegistration {
        let now = Utc::now();
        FailedRegistration {
            id: FailedRegistrationId::new(1),
            order_id: OrderId::new(1),
            order_item_id: OrderItemId::new(1),
            domain_name: "example.rw".to_owned(),
            status,
            retry_count,
            max_retries: 3,
            failure_reason: "registry timeout".to_owned(),
            contact_ids: serde_json::to_value(ContactSnapshot::single(ContactId::new(7)))
                .expect("snapshot serializes"),
            last_attempted_at: None,
            next_retry_at: Some(now),
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_can_retry_within_budget() {
        assert!(record(FailureStatus::Pending, 0).can_retry());
        assert!(record(FailureStatus::Retrying, 2).can_retry());
    }

    #[test]
    fn test_cannot_retry_exhausted_budget() {
        assert!(!record(FailureStatus::Retrying, 3).can_retry());
    }

    #[test]
    fn test_cannot_retry_terminal_states() {
        assert!(!record(FailureStatus::Resolved, 1).can_retry());
        assert!(!record(FailureStatus::Abandoned, 3).can_retry());
        // Terminal beats budget: a resolved record with budget left stays put.
        assert!(!record(FailureStatus::Resolved, 0).can_retry());
    }

    #[test]
    fn test_due_predicate() {
        let now = Utc::now();
        let mut rec = record(FailureStatus::Retrying, 1);
        rec.next_retry_at = Some(now - chrono::Duration::minutes(5));
        assert!(rec.is_due(now));

        rec.next_retry_at = Some(now + chrono::Duration::minutes(5));
        assert!(!rec.is_due(now));
    }

    #[test]
    fn test_contacts_round_trip() {
        let rec = record(FailureStatus::Pending, 0);
        let contacts = rec.contacts().expect("valid snapshot");
        assert_eq!(contacts.registrant, ContactId::new(7));
    }

    #[test]
    fn test_policy_fixed_backoff() {
        let policy = RetryPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.next_retry_at(now), now + chrono::Duration::hours(1));
        assert_eq!(policy.max_retries, 3);
    }
}
