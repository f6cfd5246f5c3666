//! Scenario tests for the retry service: lifecycle transitions,
//! idempotence under at-least-once delivery, the claim race, and the
//! abandonment path.

use std::sync::Arc;

use chrono::Utc;

use kivu_core::{ContactId, ContactSnapshot, FailureStatus, OrderStatus, OrderType};
use kivu_integration_tests::{
    MemoryStore, MockRegistrar, RecordingNotifier, RecordingQueue, ScriptedOutcome,
};
use kivu_orders::models::RetryPolicy;
use kivu_orders::services::notifications::NotificationEvent;
use kivu_orders::services::orchestrator::RegistrationOrchestrator;
use kivu_orders::services::retry::{RetryOutcome, RetryService};

struct Harness {
    store: Arc<MemoryStore>,
    registrar: Arc<MockRegistrar>,
    notifier: Arc<RecordingNotifier>,
    queue: Arc<RecordingQueue>,
    orchestrator: RegistrationOrchestrator,
    retry: RetryService,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let registrar = Arc::new(MockRegistrar::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let queue = Arc::new(RecordingQueue::new());
    let orchestrator = RegistrationOrchestrator::new(
        store.clone(),
        registrar.clone(),
        notifier.clone(),
        queue.clone(),
        RetryPolicy::default(),
        Vec::new(),
    );
    let retry = RetryService::new(
        store.clone(),
        registrar.clone(),
        notifier.clone(),
        queue.clone(),
        RetryPolicy::default(),
    );
    Harness {
        store,
        registrar,
        notifier,
        queue,
        orchestrator,
        retry,
    }
}

fn contacts() -> ContactSnapshot {
    ContactSnapshot::single(ContactId::new(77))
}

/// Seed an order whose listed domains fail on the first attempt, leaving
/// real failure records created by the orchestrator itself.
async fn seed_with_failures(h: &Harness, ok: &[&str], failing: &[&str]) -> kivu_core::OrderId {
    let mut items: Vec<(&str, i32)> = ok.iter().map(|d| (*d, 1)).collect();
    items.extend(failing.iter().map(|d| (*d, 1)));
    let order_id = h.store.seed_order(OrderType::Registration, &items);

    for domain in failing {
        h.registrar
            .script(domain, ScriptedOutcome::Reject("registry timeout".to_owned()));
    }

    h.orchestrator
        .process_order(order_id, contacts())
        .await
        .expect("processes");
    order_id
}

// =============================================================================
// Scenario C: last attempt fails, record abandoned
// =============================================================================

#[tokio::test]
async fn test_exhausted_budget_abandons_and_notifies() {
    let h = harness();
    let order_id = seed_with_failures(&h, &["kept.rw"], &["stuck.com"]).await;

    let failure = h.store.failures_for(order_id).pop().expect("record exists");
    h.store.tweak_failure(failure.id, |f| f.retry_count = 2);
    h.registrar.script(
        "stuck.com",
        ScriptedOutcome::Reject("still not possible".to_owned()),
    );
    let queued_before = h.queue.items().len();

    let outcome = h.retry.retry_one(failure.id).await.expect("retries");

    assert_eq!(outcome, RetryOutcome::Abandoned);
    let record = h.store.failure(failure.id);
    assert_eq!(record.status, FailureStatus::Abandoned);
    assert_eq!(record.retry_count, 3);
    assert_eq!(record.failure_reason, "still not possible");
    assert!(record.next_retry_at.is_none());

    // No further retry was scheduled.
    assert_eq!(h.queue.items().len(), queued_before);

    // Abandonment notification (admin + customer variants) went out last.
    let events = h.notifier.events();
    assert!(matches!(
        events.last(),
        Some(NotificationEvent::RegistrationAbandoned { domain, retry_count, .. })
            if domain == "stuck.com" && *retry_count == 3
    ));
}

// =============================================================================
// Scenario D: retry succeeds, order completes
// =============================================================================

#[tokio::test]
async fn test_successful_retry_resolves_and_completes_order() {
    let h = harness();
    let order_id = seed_with_failures(&h, &["fine.rw"], &["flaky.com"]).await;
    assert_eq!(h.store.order_status(order_id), OrderStatus::PartiallyCompleted);

    let failure = h.store.failures_for(order_id).pop().expect("record exists");
    h.store.tweak_failure(failure.id, |f| f.retry_count = 1);

    // Next attempt succeeds (unscripted domains succeed).
    let outcome = h.retry.retry_one(failure.id).await.expect("retries");

    assert_eq!(
        outcome,
        RetryOutcome::Resolved {
            order_completed: true
        }
    );

    let record = h.store.failure(failure.id);
    assert_eq!(record.status, FailureStatus::Resolved);
    assert!(record.resolved_at.is_some());

    // Item carries the provider handle; order moved to completed.
    assert!(h.store.item_by_domain("flaky.com").is_registered());
    assert_eq!(h.store.order_status(order_id), OrderStatus::Completed);
}

#[tokio::test]
async fn test_resolution_with_other_failures_outstanding_keeps_order() {
    let h = harness();
    let order_id = seed_with_failures(&h, &[], &["one.com", "two.com"]).await;
    assert_eq!(h.store.order_status(order_id), OrderStatus::Failed);

    let failures = h.store.failures_for(order_id);
    let first = failures
        .iter()
        .find(|f| f.domain_name == "one.com")
        .expect("record exists");

    let outcome = h.retry.retry_one(first.id).await.expect("retries");

    assert_eq!(
        outcome,
        RetryOutcome::Resolved {
            order_completed: false
        }
    );
    // The sibling failure still blocks completion.
    assert_eq!(h.store.order_status(order_id), OrderStatus::Failed);
}

// =============================================================================
// Idempotence under at-least-once delivery
// =============================================================================

#[tokio::test]
async fn test_retry_of_terminal_record_is_noop() {
    let h = harness();
    let order_id = seed_with_failures(&h, &[], &["done.com"]).await;
    let failure = h.store.failures_for(order_id).pop().expect("record exists");

    // Resolve it once.
    h.retry.retry_one(failure.id).await.expect("retries");
    let calls_after_resolve = h.registrar.register_calls().len();
    let resolved = h.store.failure(failure.id);
    assert_eq!(resolved.status, FailureStatus::Resolved);

    // Redelivered retry: no registrar call, no state change.
    let outcome = h.retry.retry_one(failure.id).await.expect("no-op");
    assert_eq!(outcome, RetryOutcome::Skipped);
    assert_eq!(h.registrar.register_calls().len(), calls_after_resolve);
    assert_eq!(h.store.failure(failure.id).status, FailureStatus::Resolved);
    assert_eq!(
        h.store.failure(failure.id).resolved_at,
        resolved.resolved_at
    );
}

#[tokio::test]
async fn test_retry_of_abandoned_record_is_noop() {
    let h = harness();
    let order_id = seed_with_failures(&h, &[], &["gone.com"]).await;
    let failure = h.store.failures_for(order_id).pop().expect("record exists");
    h.store.tweak_failure(failure.id, |f| {
        f.status = FailureStatus::Abandoned;
        f.retry_count = 3;
    });
    let calls_before = h.registrar.register_calls().len();

    let outcome = h.retry.retry_one(failure.id).await.expect("no-op");

    assert_eq!(outcome, RetryOutcome::Skipped);
    assert_eq!(h.registrar.register_calls().len(), calls_before);
}

// =============================================================================
// Retry budget invariant
// =============================================================================

#[tokio::test]
async fn test_retry_count_never_exceeds_budget() {
    let h = harness();
    let order_id = seed_with_failures(&h, &[], &["never.com"]).await;
    let failure = h.store.failures_for(order_id).pop().expect("record exists");

    // Keep rejecting; call more times than the budget allows.
    for _ in 0..5 {
        h.registrar
            .script("never.com", ScriptedOutcome::Reject("no".to_owned()));
    }
    for _ in 0..5 {
        h.retry.retry_one(failure.id).await.expect("retries");
    }

    let record = h.store.failure(failure.id);
    assert_eq!(record.retry_count, record.max_retries);
    assert_eq!(record.status, FailureStatus::Abandoned);
    // Initial attempt + exactly max_retries retries.
    assert_eq!(h.registrar.register_calls().len(), 1 + 3);
}

// =============================================================================
// Claim race: exactly one registrar call
// =============================================================================

#[tokio::test]
async fn test_concurrent_retries_make_exactly_one_registrar_call() {
    let h = harness();
    let order_id = seed_with_failures(&h, &[], &["contested.com"]).await;
    let failure = h.store.failures_for(order_id).pop().expect("record exists");
    h.registrar.script(
        "contested.com",
        ScriptedOutcome::Reject("still failing".to_owned()),
    );
    let calls_before = h.registrar.register_calls().len();

    let (a, b) = tokio::join!(
        h.retry.retry_one(failure.id),
        h.retry.retry_one(failure.id)
    );
    let outcomes = [a.expect("first attempt"), b.expect("second attempt")];

    // The loser of the compare-and-set performed zero registrar calls.
    assert_eq!(h.registrar.register_calls().len(), calls_before + 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == RetryOutcome::Skipped)
            .count(),
        1,
        "exactly one attempt must lose the claim: {outcomes:?}"
    );
    assert_eq!(h.store.failure(failure.id).retry_count, 1);
}

// =============================================================================
// Sweep
// =============================================================================

#[tokio::test]
async fn test_sweep_processes_due_records_only() {
    let h = harness();
    let order_id = seed_with_failures(&h, &[], &["due.com", "later.com"]).await;

    let failures = h.store.failures_for(order_id);
    let due = failures
        .iter()
        .find(|f| f.domain_name == "due.com")
        .expect("record exists");
    let later = failures
        .iter()
        .find(|f| f.domain_name == "later.com")
        .expect("record exists");

    // One due now, one due in an hour.
    h.store.tweak_failure(due.id, |f| {
        f.next_retry_at = Some(Utc::now() - chrono::Duration::minutes(1));
    });
    h.store.tweak_failure(later.id, |f| {
        f.next_retry_at = Some(Utc::now() + chrono::Duration::hours(1));
    });

    let summary = h.retry.run_due(50).await.expect("sweeps");

    assert_eq!(summary.due, 1);
    assert_eq!(summary.resolved, 1);
    assert_eq!(h.store.failure(due.id).status, FailureStatus::Resolved);
    assert_eq!(h.store.failure(later.id).status, FailureStatus::Pending);
}

#[tokio::test]
async fn test_sweep_resolving_last_failure_completes_order() {
    let h = harness();
    let order_id = seed_with_failures(&h, &[], &["a.com", "b.com"]).await;
    assert_eq!(h.store.order_status(order_id), OrderStatus::Failed);

    for failure in h.store.failures_for(order_id) {
        h.store.tweak_failure(failure.id, |f| {
            f.next_retry_at = Some(Utc::now() - chrono::Duration::minutes(1));
        });
    }

    let summary = h.retry.run_due(50).await.expect("sweeps");

    assert_eq!(summary.resolved, 2);
    // An order whose every registration eventually succeeded finishes as
    // completed, even from failed.
    assert_eq!(h.store.order_status(order_id), OrderStatus::Completed);
}

#[tokio::test]
async fn test_retry_of_unknown_record_is_skipped() {
    let h = harness();
    let outcome = h
        .retry
        .retry_one(kivu_core::FailedRegistrationId::new(999))
        .await
        .expect("no-op");
    assert_eq!(outcome, RetryOutcome::Skipped);
    assert!(h.registrar.register_calls().is_empty());
}
