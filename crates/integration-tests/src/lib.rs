//! Test harness for the fulfillment engine.
//!
//! Provides in-memory substitutes for every capability the orchestrator
//! and retry service consume, so the scenario tests in `tests/` exercise
//! the real service code without a database or a live registrar:
//!
//! - [`MemoryStore`] - an `OrderStore` with the same compare-and-set
//!   claim semantics as the Postgres implementation
//! - [`MockRegistrar`] - scripted per-domain outcomes plus call counting
//! - [`RecordingNotifier`] / [`RecordingQueue`] - capture what the engine
//!   produced for assertions

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use kivu_core::{
    ContactSnapshot, DomainName, FailedRegistrationId, OrderId, OrderItemId, OrderStatus,
    OrderType, UserId,
};
use kivu_orders::jobs::{JobQueue, QueueError, WorkItem};
use kivu_orders::models::{FailedRegistration, NewFailedRegistration, Order, OrderItem,
    OrderWithItems};
use kivu_orders::registrar::{
    Availability, DomainInfo, RegistrarClient, RegistrarError, RegistrarResponse,
    RegistrationRequest,
};
use kivu_orders::services::notifications::{NotificationDispatcher, NotificationEvent, NotifyError};
use kivu_orders::store::{OrderStore, StoreError};

/// Claim lease mirrored from the Postgres store.
const ATTEMPT_LEASE_SECS: i64 = 600;

#[derive(Default)]
struct Inner {
    orders: BTreeMap<i32, Order>,
    items: BTreeMap<i32, OrderItem>,
    failures: BTreeMap<i32, FailedRegistration>,
    next_order_id: i32,
    next_item_id: i32,
    next_failure_id: i32,
}

/// In-memory `OrderStore` with the production claim semantics.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// When set, `mark_item_registered` fails - used to simulate an
    /// unexpected storage fault escaping the orchestrator's item loop.
    pub poison_mark_item_registered: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order in `pending` with one item per `(domain, years)` pair.
    pub fn seed_order(&self, order_type: OrderType, domains: &[(&str, i32)]) -> OrderId {
        let mut inner = self.inner.lock().expect("store lock");
        inner.next_order_id += 1;
        let order_id = OrderId::new(inner.next_order_id);
        let now = Utc::now();

        inner.orders.insert(
            order_id.as_i32(),
            Order {
                id: order_id,
                order_number: format!("ORD-{:06}", order_id.as_i32()),
                user_id: UserId::new(1),
                customer_email: "customer@example.com".to_owned(),
                order_type,
                status: OrderStatus::Pending,
                currency_code: "RWF".to_owned(),
                total_amount: Decimal::new(15_000, 0),
                notes: None,
                created_at: now,
                updated_at: now,
            },
        );

        for (domain, years) in domains {
            inner.next_item_id += 1;
            let item_id = inner.next_item_id;
            inner.items.insert(
                item_id,
                OrderItem {
                    id: OrderItemId::new(item_id),
                    order_id,
                    domain_name: (*domain).to_owned(),
                    years: *years,
                    price: Decimal::new(15_000, 0),
                    currency_code: "RWF".to_owned(),
                    domain_id: None,
                    metadata: serde_json::json!({}),
                    created_at: now,
                },
            );
        }

        order_id
    }

    /// Current status of an order.
    #[must_use]
    pub fn order_status(&self, order_id: OrderId) -> OrderStatus {
        self.inner
            .lock()
            .expect("store lock")
            .orders
            .get(&order_id.as_i32())
            .expect("order exists")
            .status
    }

    /// Notes of an order.
    #[must_use]
    pub fn order_notes(&self, order_id: OrderId) -> Option<String> {
        self.inner
            .lock()
            .expect("store lock")
            .orders
            .get(&order_id.as_i32())
            .expect("order exists")
            .notes
            .clone()
    }

    /// Every failure record for an order.
    #[must_use]
    pub fn failures_for(&self, order_id: OrderId) -> Vec<FailedRegistration> {
        self.inner
            .lock()
            .expect("store lock")
            .failures
            .values()
            .filter(|f| f.order_id == order_id)
            .cloned()
            .collect()
    }

    /// One failure record.
    #[must_use]
    pub fn failure(&self, id: FailedRegistrationId) -> FailedRegistration {
        self.inner
            .lock()
            .expect("store lock")
            .failures
            .get(&id.as_i32())
            .expect("failure exists")
            .clone()
    }

    /// Mutate a failure record directly (test setup only).
    pub fn tweak_failure(
        &self,
        id: FailedRegistrationId,
        mutate: impl FnOnce(&mut FailedRegistration),
    ) {
        let mut inner = self.inner.lock().expect("store lock");
        let record = inner.failures.get_mut(&id.as_i32()).expect("failure exists");
        mutate(record);
    }

    /// Item lookup by domain name (test assertions).
    #[must_use]
    pub fn item_by_domain(&self, domain: &str) -> OrderItem {
        self.inner
            .lock()
            .expect("store lock")
            .items
            .values()
            .find(|i| i.domain_name == domain)
            .expect("item exists")
            .clone()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn order_with_items(&self, order_id: OrderId) -> Result<OrderWithItems, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        let order = inner
            .orders
            .get(&order_id.as_i32())
            .cloned()
            .ok_or(StoreError::OrderNotFound(order_id))?;
        let items = inner
            .items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect();
        Ok(OrderWithItems { order, items })
    }

    async fn order_item(&self, item_id: OrderItemId) -> Result<OrderItem, StoreError> {
        self.inner
            .lock()
            .expect("store lock")
            .items
            .get(&item_id.as_i32())
            .cloned()
            .ok_or(StoreError::OrderItemNotFound(item_id))
    }

    async fn begin_processing(&self, order_id: OrderId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let order = inner
            .orders
            .get_mut(&order_id.as_i32())
            .ok_or(StoreError::OrderNotFound(order_id))?;
        if order.status.is_in_flight() {
            order.status = OrderStatus::Processing;
            order.updated_at = Utc::now();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn finish_processing(
        &self,
        order_id: OrderId,
        outcome: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let order = inner
            .orders
            .get_mut(&order_id.as_i32())
            .ok_or(StoreError::OrderNotFound(order_id))?;
        if order.status == OrderStatus::Processing {
            order.status = outcome;
            order.updated_at = Utc::now();
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
        let mut inner = self.inner.lock().expect("store lock");
        let order = inner
            .orders
            .get_mut(&order_id.as_i32())
            .ok_or(StoreError::OrderNotFound(order_id))?;
        if order.status.is_in_flight() {
            order.status = OrderStatus::RequiresAttention;
        }
        order.notes = Some(match order.notes.take() {
            Some(existing) => format!("{existing}\n{note}"),
            None => note.to_owned(),
        });
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_item_registered(
        &self,
        item_id: OrderItemId,
        domain_id: &str,
    ) -> Result<(), StoreError> {
        if self.poison_mark_item_registered.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidState(
                "storage fault injected by test".to_owned(),
            ));
        }
        let mut inner = self.inner.lock().expect("store lock");
        let item = inner
            .items
            .get_mut(&item_id.as_i32())
            .ok_or(StoreError::OrderItemNotFound(item_id))?;
        item.domain_id = Some(domain_id.to_owned());
        Ok(())
    }

    async fn record_failure(
        &self,
        params: NewFailedRegistration,
    ) -> Result<FailedRegistration, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let now = Utc::now();

        if let Some(existing) = inner
            .failures
            .values_mut()
            .find(|f| f.order_item_id == params.order_item_id)
        {
            existing.failure_reason = params.failure_reason;
            existing.last_attempted_at = Some(now);
            existing.next_retry_at = Some(params.next_retry_at);
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        inner.next_failure_id += 1;
        let id = FailedRegistrationId::new(inner.next_failure_id);
        let record = FailedRegistration {
            id,
            order_id: params.order_id,
            order_item_id: params.order_item_id,
            domain_name: params.domain_name,
            status: kivu_core::FailureStatus::Pending,
            retry_count: 0,
            max_retries: params.max_retries,
            failure_reason: params.failure_reason,
            contact_ids: serde_json::to_value(params.contacts)
                .expect("contact snapshot serializes"),
            last_attempted_at: Some(now),
            next_retry_at: Some(params.next_retry_at),
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.failures.insert(id.as_i32(), record.clone());
        Ok(record)
    }

    async fn failed_registration(
        &self,
        id: FailedRegistrationId,
    ) -> Result<Option<FailedRegistration>, StoreError> {
        Ok(self
            .inner
            .lock()
            .expect("store lock")
            .failures
            .get(&id.as_i32())
            .cloned())
    }

    async fn claim_for_retry(
        &self,
        id: FailedRegistrationId,
    ) -> Result<Option<FailedRegistration>, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let now = Utc::now();
        let Some(record) = inner.failures.get_mut(&id.as_i32()) else {
            return Ok(None);
        };

        if record.status.is_terminal() || record.retry_count >= record.max_retries {
            return Ok(None);
        }

        // In-flight marker: retrying with no schedule and a fresh stamp.
        let in_flight = record.status == kivu_core::FailureStatus::Retrying
            && record.next_retry_at.is_none()
            && record.last_attempted_at.is_some_and(|at| {
                at > now - chrono::Duration::seconds(ATTEMPT_LEASE_SECS)
            });
        if in_flight {
            return Ok(None);
        }

        record.status = kivu_core::FailureStatus::Retrying;
        record.retry_count += 1;
        record.last_attempted_at = Some(now);
        record.next_retry_at = None;
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn schedule_next_retry(
        &self,
        id: FailedRegistrationId,
        reason: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<FailedRegistration, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let record = inner
            .failures
            .get_mut(&id.as_i32())
            .ok_or(StoreError::FailureNotFound(id))?;
        if record.status != kivu_core::FailureStatus::Retrying {
            return Err(StoreError::InvalidState(format!(
                "failed registration {id} is not retrying"
            )));
        }
        record.failure_reason = reason.to_owned();
        record.next_retry_at = Some(next_retry_at);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn abandon(
        &self,
        id: FailedRegistrationId,
        reason: &str,
    ) -> Result<FailedRegistration, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let record = inner
            .failures
            .get_mut(&id.as_i32())
            .ok_or(StoreError::FailureNotFound(id))?;
        if record.status.is_terminal() {
            return Err(StoreError::InvalidState(format!(
                "failed registration {id} is already terminal"
            )));
        }
        record.status = kivu_core::FailureStatus::Abandoned;
        record.failure_reason = reason.to_owned();
        record.next_retry_at = None;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn resolve(&self, id: FailedRegistrationId) -> Result<FailedRegistration, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let record = inner
            .failures
            .get_mut(&id.as_i32())
            .ok_or(StoreError::FailureNotFound(id))?;
        if record.status.is_terminal() {
            return Err(StoreError::InvalidState(format!(
                "failed registration {id} is already terminal"
            )));
        }
        record.status = kivu_core::FailureStatus::Resolved;
        record.resolved_at = Some(Utc::now());
        record.next_retry_at = None;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn due_failures(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FailedRegistration>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        let mut due: Vec<FailedRegistration> = inner
            .failures
            .values()
            .filter(|f| {
                !f.status.is_terminal()
                    && f.retry_count < f.max_retries
                    && f.next_retry_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|f| f.next_retry_at);
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn retryable_failures(
        &self,
        order_id: Option<OrderId>,
    ) -> Result<Vec<FailedRegistration>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .failures
            .values()
            .filter(|f| !f.status.is_terminal())
            .filter(|f| order_id.is_none_or(|id| f.order_id == id))
            .cloned()
            .collect())
    }

    async fn complete_order_if_fulfilled(
        &self,
        order_id: OrderId,
    ) -> Result<Option<OrderStatus>, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let outstanding = inner
            .failures
            .values()
            .filter(|f| f.order_id == order_id && !f.status.is_terminal())
            .count();
        let order = inner
            .orders
            .get_mut(&order_id.as_i32())
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if outstanding == 0
            && matches!(
                order.status,
                OrderStatus::PartiallyCompleted | OrderStatus::Failed
            )
        {
            order.status = OrderStatus::Completed;
            order.updated_at = Utc::now();
            Ok(Some(OrderStatus::Completed))
        } else {
            Ok(None)
        }
    }
}

/// Scripted outcome for one registration attempt.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Registrar accepts; a provider handle is issued.
    Success,
    /// Registrar rejects with this message.
    Reject(String),
    /// Transport-level failure (timeout, connection trouble).
    Transport(String),
}

/// Mock registrar with scripted per-domain outcomes and call counting.
///
/// Unscripted domains register successfully.
#[derive(Default)]
pub struct MockRegistrar {
    scripted: Mutex<HashMap<String, VecDeque<ScriptedOutcome>>>,
    register_calls: Mutex<Vec<String>>,
}

impl MockRegistrar {
    /// Create a mock where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next outcome for a domain (FIFO per domain).
    pub fn script(&self, domain: &str, outcome: ScriptedOutcome) {
        self.scripted
            .lock()
            .expect("script lock")
            .entry(domain.to_owned())
            .or_default()
            .push_back(outcome);
    }

    /// Every `register_domain` call made, in order.
    #[must_use]
    pub fn register_calls(&self) -> Vec<String> {
        self.register_calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl RegistrarClient for MockRegistrar {
    async fn check_availability(
        &self,
        domains: &[DomainName],
    ) -> Result<Vec<(DomainName, Availability)>, RegistrarError> {
        Ok(domains
            .iter()
            .map(|d| {
                (
                    d.clone(),
                    Availability {
                        available: true,
                        reason: "ok".to_owned(),
                    },
                )
            })
            .collect())
    }

    async fn register_domain(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrarResponse, RegistrarError> {
        // A real registration is a network round-trip; yielding here gives
        // concurrent attempts in the tests a scheduling point, like the
        // real client's socket await.
        tokio::task::yield_now().await;

        let domain = request.domain.to_string();
        self.register_calls
            .lock()
            .expect("calls lock")
            .push(domain.clone());

        let outcome = self
            .scripted
            .lock()
            .expect("script lock")
            .get_mut(&domain)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedOutcome::Success);

        match outcome {
            ScriptedOutcome::Success => Ok(RegistrarResponse {
                success: true,
                message: format!("Domain {domain} registered"),
                domain_id: Some(format!("D-{domain}")),
                charged_amount: None,
                provider_order_id: None,
            }),
            ScriptedOutcome::Reject(message) => Ok(RegistrarResponse::rejected(message)),
            ScriptedOutcome::Transport(message) => Err(RegistrarError::Connection(message)),
        }
    }

    async fn renew_domain(
        &self,
        domain: &DomainName,
        _years: i32,
    ) -> Result<RegistrarResponse, RegistrarError> {
        Ok(RegistrarResponse {
            success: true,
            message: format!("Domain {domain} renewed"),
            domain_id: Some(format!("D-{domain}")),
            charged_amount: None,
            provider_order_id: None,
        })
    }

    async fn transfer_domain(
        &self,
        domain: &DomainName,
        _auth_code: &str,
        _contacts: &ContactSnapshot,
    ) -> Result<RegistrarResponse, RegistrarError> {
        Ok(RegistrarResponse {
            success: true,
            message: format!("Transfer of {domain} initiated"),
            domain_id: None,
            charged_amount: None,
            provider_order_id: None,
        })
    }

    async fn update_nameservers(
        &self,
        domain: &DomainName,
        _nameservers: &[String],
    ) -> Result<RegistrarResponse, RegistrarError> {
        Ok(RegistrarResponse {
            success: true,
            message: format!("Nameservers updated for {domain}"),
            domain_id: None,
            charged_amount: None,
            provider_order_id: None,
        })
    }

    async fn set_domain_lock(
        &self,
        domain: &DomainName,
        _locked: bool,
    ) -> Result<RegistrarResponse, RegistrarError> {
        Ok(RegistrarResponse {
            success: true,
            message: format!("Lock toggled for {domain}"),
            domain_id: None,
            charged_amount: None,
            provider_order_id: None,
        })
    }

    async fn get_domain_info(&self, domain: &DomainName) -> Result<DomainInfo, RegistrarError> {
        Ok(DomainInfo {
            domain: domain.to_string(),
            statuses: vec!["ok".to_owned()],
            registrant: None,
            created_date: None,
            expiry_date: None,
        })
    }
}

/// Notifier that records every dispatched event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event dispatched so far.
    #[must_use]
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn dispatch(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        self.events.lock().expect("events lock").push(event);
        Ok(())
    }
}

/// Queue that records every scheduled work item.
#[derive(Default)]
pub struct RecordingQueue {
    items: Mutex<Vec<(WorkItem, Option<Duration>)>>,
}

impl RecordingQueue {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every work item enqueued so far.
    #[must_use]
    pub fn items(&self) -> Vec<(WorkItem, Option<Duration>)> {
        self.items.lock().expect("items lock").clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, item: WorkItem, delay: Option<Duration>) -> Result<(), QueueError> {
        self.items.lock().expect("items lock").push((item, delay));
        Ok(())
    }
}
