//! Scenario tests for the registration orchestrator.
//!
//! These drive the real orchestrator against the in-memory store and the
//! scripted registrar, covering the aggregate classification rules and
//! the unexpected-fault escape hatch.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use kivu_core::{ContactId, ContactSnapshot, DomainName, OrderType, Registrar};
use kivu_integration_tests::{
    MemoryStore, MockRegistrar, RecordingNotifier, RecordingQueue, ScriptedOutcome,
};
use kivu_orders::jobs::WorkItem;
use kivu_orders::models::RetryPolicy;
use kivu_orders::services::notifications::NotificationEvent;
use kivu_orders::services::orchestrator::{ProcessOutcome, RegistrationOrchestrator};

struct Harness {
    store: Arc<MemoryStore>,
    registrar: Arc<MockRegistrar>,
    notifier: Arc<RecordingNotifier>,
    queue: Arc<RecordingQueue>,
    orchestrator: RegistrationOrchestrator,
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
    Harness {
        store,
        registrar,
        notifier,
        queue,
        orchestrator,
    }
}

fn contacts() -> ContactSnapshot {
    ContactSnapshot::single(ContactId::new(77))
}

// =============================================================================
// Scenario A: every registration succeeds
// =============================================================================

#[tokio::test]
async fn test_all_domains_succeed_completes_order() {
    let h = harness();
    let order_id = h
        .store
        .seed_order(OrderType::Registration, &[("akagera.rw", 1), ("akagera.com", 2)]);

    let outcome = h
        .orchestrator
        .process_order(order_id, contacts())
        .await
        .expect("processes");

    assert_eq!(outcome, ProcessOutcome::Completed);
    assert_eq!(
        h.store.order_status(order_id),
        kivu_core::OrderStatus::Completed
    );
    assert!(h.store.failures_for(order_id).is_empty());
    assert_eq!(h.registrar.register_calls().len(), 2);

    // Items carry the provider handles.
    assert!(h.store.item_by_domain("akagera.rw").is_registered());
    assert!(h.store.item_by_domain("akagera.com").is_registered());

    // Confirmation went out.
    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        NotificationEvent::OrderConfirmation { domains, .. } if domains.len() == 2
    ));
}

// =============================================================================
// Scenario B: one of two fails
// =============================================================================

#[tokio::test]
async fn test_partial_failure_records_and_schedules_retry() {
    let h = harness();
    let order_id = h
        .store
        .seed_order(OrderType::Registration, &[("nyungwe.rw", 1), ("nyungwe.com", 1)]);
    h.registrar.script(
        "nyungwe.com",
        ScriptedOutcome::Reject("Domain not available for registration".to_owned()),
    );

    let outcome = h
        .orchestrator
        .process_order(order_id, contacts())
        .await
        .expect("processes");

    assert_eq!(outcome, ProcessOutcome::PartiallyCompleted);
    assert_eq!(
        h.store.order_status(order_id),
        kivu_core::OrderStatus::PartiallyCompleted
    );

    let failures = h.store.failures_for(order_id);
    assert_eq!(failures.len(), 1);
    let failure = &failures[0];
    assert_eq!(failure.domain_name, "nyungwe.com");
    assert_eq!(failure.status, kivu_core::FailureStatus::Pending);
    assert_eq!(failure.retry_count, 0);
    assert!(failure.next_retry_at.is_some());
    // Rejection text was normalized for the taken-domain case.
    assert!(failure.failure_reason.contains("no longer available"));

    // A delayed retry work item was scheduled.
    let items = h.queue.items();
    assert_eq!(items.len(), 1);
    assert!(matches!(
        items[0].0,
        WorkItem::RetryFailedRegistration { failed_registration_id } if failed_registration_id == failure.id
    ));
    assert_eq!(items[0].1, Some(Duration::from_secs(3600)));

    // Partial-failure notification carries both partitions.
    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        NotificationEvent::PartialRegistrationFailure { successful, failed, .. }
            if successful == &vec!["nyungwe.rw".to_owned()] && failed.len() == 1
    ));
}

// =============================================================================
// Full failure
// =============================================================================

#[tokio::test]
async fn test_all_domains_fail_marks_order_failed() {
    let h = harness();
    let order_id = h
        .store
        .seed_order(OrderType::Registration, &[("volcanoes.com", 1), ("virunga.com", 1)]);
    h.registrar
        .script("volcanoes.com", ScriptedOutcome::Reject("2302 Object exists".to_owned()));
    h.registrar.script(
        "virunga.com",
        ScriptedOutcome::Transport("connection reset by registry".to_owned()),
    );

    let outcome = h
        .orchestrator
        .process_order(order_id, contacts())
        .await
        .expect("processes");

    assert_eq!(outcome, ProcessOutcome::Failed);
    assert_eq!(h.store.order_status(order_id), kivu_core::OrderStatus::Failed);
    // Both kinds of failure (rejection and transport) entered the retry path.
    assert_eq!(h.store.failures_for(order_id).len(), 2);

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        NotificationEvent::FullRegistrationFailure { failed, .. } if failed.len() == 2
    ));
}

// =============================================================================
// Scenario E: unexpected fault mid-loop
// =============================================================================

#[tokio::test]
async fn test_unexpected_fault_parks_order_for_humans() {
    let h = harness();
    let order_id = h
        .store
        .seed_order(OrderType::Registration, &[("gishwati.rw", 1), ("mukura.rw", 1)]);
    h.store
        .poison_mark_item_registered
        .store(true, Ordering::SeqCst);

    let outcome = h
        .orchestrator
        .process_order(order_id, contacts())
        .await
        .expect("handled as requires_attention, not an error");

    assert_eq!(outcome, ProcessOutcome::RequiresAttention);
    assert_eq!(
        h.store.order_status(order_id),
        kivu_core::OrderStatus::RequiresAttention
    );

    // The fault text lands in the order notes.
    let notes = h.store.order_notes(order_id).expect("note appended");
    assert!(notes.contains("Payment succeeded but processing failed"));
    assert!(notes.contains("storage fault injected by test"));

    // The fault aborted the loop: only the first item was attempted, and
    // no failure record was created for either.
    assert_eq!(h.registrar.register_calls().len(), 1);
    assert!(h.store.failures_for(order_id).is_empty());

    // Distinct critical notification, not a partial/full failure event.
    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        NotificationEvent::CriticalOrderFailure { error, .. }
            if error.contains("storage fault injected by test")
    ));
}

// =============================================================================
// Guards and routing
// =============================================================================

#[tokio::test]
async fn test_terminal_order_is_not_reprocessed() {
    let h = harness();
    let order_id = h
        .store
        .seed_order(OrderType::Registration, &[("ruhengeri.rw", 1)]);

    let first = h
        .orchestrator
        .process_order(order_id, contacts())
        .await
        .expect("processes");
    assert_eq!(first, ProcessOutcome::Completed);

    let second = h
        .orchestrator
        .process_order(order_id, contacts())
        .await
        .expect("no-op");
    assert_eq!(second, ProcessOutcome::AlreadyFinished);
    // No second registrar call was made.
    assert_eq!(h.registrar.register_calls().len(), 1);
}

#[tokio::test]
async fn test_order_never_left_in_flight() {
    for script in [None, Some(ScriptedOutcome::Reject("taken".to_owned()))] {
        let h = harness();
        let order_id = h.store.seed_order(OrderType::Registration, &[("huye.rw", 1)]);
        if let Some(outcome) = script {
            h.registrar.script("huye.rw", outcome);
        }

        h.orchestrator
            .process_order(order_id, contacts())
            .await
            .expect("processes");

        let status = h.store.order_status(order_id);
        assert!(
            !status.is_in_flight(),
            "order left in flight with status {status}"
        );
    }
}

#[tokio::test]
async fn test_hosting_order_completes_without_registrar() {
    let h = harness();
    let order_id = h.store.seed_order(OrderType::Hosting, &[]);

    let outcome = h
        .orchestrator
        .process_order(order_id, contacts())
        .await
        .expect("processes");

    assert_eq!(outcome, ProcessOutcome::Completed);
    assert!(h.registrar.register_calls().is_empty());
}

#[test]
fn test_registrar_routing_is_pure_and_deterministic() {
    let cases = [
        ("igihe.rw", Registrar::LocalRegistry),
        ("shop.kigali.rw", Registrar::LocalRegistry),
        ("igihe.com", Registrar::Reseller),
        ("rwanda.org", Registrar::Reseller),
    ];
    for (name, expected) in cases {
        let domain = DomainName::parse(name).expect("valid");
        for _ in 0..3 {
            assert_eq!(Registrar::for_domain(&domain), expected, "{name}");
        }
    }
}
