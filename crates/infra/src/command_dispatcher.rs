//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (department-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events)
//!   ↓
//! 3. Handle command (pure decision, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency)
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! `dispatch` runs that pipeline for one aggregate. When a single business
//! step has to move two aggregates at once (a borrow approval and its stock
//! reservation), callers `load` each aggregate, decide, `stage` the events in
//! a [`UnitOfWork`] and `commit` it: every stream is appended atomically and
//! only then published.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use borrowdesk_core::{Aggregate, AggregateId, DepartmentId, DomainError, ExpectedVersion};
use borrowdesk_events::{EventBus, EventEnvelope, execute};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale stream version). Safe to retry.
    #[error("concurrent modification: {0}")]
    Concurrency(String),
    /// Department isolation violation (cross-department or cross-aggregate stream mixing).
    #[error("department isolation violation: {0}")]
    DepartmentIsolation(String),
    /// Domain validation failure (deterministic).
    #[error("{0}")]
    Validation(String),
    /// Domain invariant failure (deterministic).
    #[error("{0}")]
    InvariantViolation(String),
    /// Domain-level conflict, e.g. creating an aggregate twice. Not retried.
    #[error("{0}")]
    Conflict(String),
    /// The actor may not perform this action on this resource.
    #[error("unauthorized")]
    Unauthorized,
    /// Domain-level not found.
    #[error("not found")]
    NotFound,
    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    /// Persisting to the event store failed.
    #[error("event store failure: {0}")]
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::DepartmentIsolation(msg) => DispatchError::DepartmentIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// An aggregate rehydrated from its stream, with the version to expect on append.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub aggregate: A,
    pub version: u64,
}

impl<A> Loaded<A> {
    pub fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version)
    }
}

/// Events decided across one or more streams, committed together.
#[derive(Debug)]
pub struct UnitOfWork {
    department_id: DepartmentId,
    staged: Vec<StreamAppend>,
}

impl UnitOfWork {
    pub fn new(department_id: DepartmentId) -> Self {
        Self {
            department_id,
            staged: Vec::new(),
        }
    }

    /// Stage typed events for one aggregate stream.
    pub fn stage<E>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: ExpectedVersion,
        events: &[E],
    ) -> Result<(), DispatchError>
    where
        E: borrowdesk_events::Event + Serialize,
    {
        if events.is_empty() {
            return Ok(());
        }

        let uncommitted = events
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    self.department_id,
                    aggregate_id,
                    aggregate_type,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.staged.push(StreamAppend::new(uncommitted, expected_version));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Guarantees:
/// - events are persisted before publication (a failed append publishes nothing)
/// - department isolation and optimistic concurrency are enforced
/// - publication failures surface as `DispatchError::Publish` after the append
///   has succeeded, giving at-least-once delivery
///
/// `S` is any [`EventStore`], `B` any bus of JSON envelopes; tests use the
/// in-memory implementations of both.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command against a single aggregate through the full pipeline.
    ///
    /// `make_aggregate` builds the empty instance to rehydrate
    /// (e.g. `InventoryItem::empty(id)`). Returns the aggregate with the
    /// committed events applied.
    pub fn dispatch<A>(
        &self,
        department_id: DepartmentId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(DepartmentId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: borrowdesk_events::Event + Serialize + DeserializeOwned,
    {
        let mut loaded = self.load(department_id, aggregate_id, make_aggregate)?;
        let expected = loaded.expected_version();
        let decided = execute(&mut loaded.aggregate, command)?;

        let mut uow = UnitOfWork::new(department_id);
        uow.stage(aggregate_id, aggregate_type, expected, &decided)?;
        self.commit(uow)?;
        Ok(loaded.aggregate)
    }

    /// Load and rehydrate one aggregate.
    pub fn load<A>(
        &self,
        department_id: DepartmentId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(DepartmentId, AggregateId) -> A,
    ) -> Result<Loaded<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(department_id, aggregate_id)?;
        validate_loaded_stream(department_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(department_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        Ok(Loaded {
            aggregate,
            version: stream_version(&history),
        })
    }

    /// Append every staged stream atomically, then publish.
    pub fn commit(&self, uow: UnitOfWork) -> Result<Vec<StoredEvent>, DispatchError> {
        if uow.is_empty() {
            return Ok(vec![]);
        }

        let committed = self.store.append_batch(uow.staged)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    department_id: DepartmentId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce isolation even if a backend returns foreign data.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.department_id != department_id {
            return Err(DispatchError::DepartmentIsolation(format!(
                "loaded stream contains wrong department_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::DepartmentIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use borrowdesk_events::InMemoryEventBus;
    use borrowdesk_inventory::{
        InventoryCommand, InventoryEvent, InventoryItem, InventoryItemId, ReceiveStock, RegisterItem,
    };
    use chrono::Utc;

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn register(d: &Dispatcher, department_id: DepartmentId, item_id: InventoryItemId) -> InventoryItem {
        d.dispatch(
            department_id,
            item_id.0,
            "inventory.item",
            &InventoryCommand::RegisterItem(RegisterItem {
                department_id,
                item_id,
                name: "Oscilloscope".to_string(),
                total_quantity: 2,
                occurred_at: Utc::now(),
            }),
            |_, id| InventoryItem::empty(InventoryItemId::new(id)),
        )
        .unwrap()
    }

    #[test]
    fn dispatch_persists_then_publishes() {
        let d = dispatcher();
        let sub = d.bus.subscribe();

        let department_id = DepartmentId::new();
        let item_id = InventoryItemId::new(AggregateId::new());
        let item = register(&d, department_id, item_id);
        assert_eq!(item.total_quantity(), 2);

        let env = sub.try_recv().unwrap();
        assert_eq!(env.sequence_number(), 1);
        assert_eq!(env.aggregate_type(), "inventory.item");
        let ev: InventoryEvent = serde_json::from_value(env.payload().clone()).unwrap();
        assert!(matches!(ev, InventoryEvent::ItemRegistered(_)));
    }

    #[test]
    fn load_rehydrates_and_reports_version() {
        let d = dispatcher();
        let department_id = DepartmentId::new();
        let item_id = InventoryItemId::new(AggregateId::new());
        register(&d, department_id, item_id);

        let loaded = d
            .load(department_id, item_id.0, |_, id| InventoryItem::empty(InventoryItemId::new(id)))
            .unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.aggregate.total_quantity(), 2);
    }

    #[test]
    fn domain_errors_are_mapped_and_nothing_is_published() {
        let d = dispatcher();
        let sub = d.bus.subscribe();
        let department_id = DepartmentId::new();
        let item_id = InventoryItemId::new(AggregateId::new());

        let err = d
            .dispatch(
                department_id,
                item_id.0,
                "inventory.item",
                &InventoryCommand::ReceiveStock(ReceiveStock {
                    department_id,
                    item_id,
                    quantity: 1,
                    occurred_at: Utc::now(),
                }),
                |_, id| InventoryItem::empty(InventoryItemId::new(id)),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn stale_unit_of_work_is_a_concurrency_error() {
        let d = dispatcher();
        let department_id = DepartmentId::new();
        let item_id = InventoryItemId::new(AggregateId::new());
        register(&d, department_id, item_id);

        let stale = d
            .load(department_id, item_id.0, |_, id| InventoryItem::empty(InventoryItemId::new(id)))
            .unwrap();
        let receive = InventoryCommand::ReceiveStock(ReceiveStock {
            department_id,
            item_id,
            quantity: 3,
            occurred_at: Utc::now(),
        });
        let events = stale.aggregate.handle(&receive).unwrap();

        // Someone else moves the stream forward first.
        d.dispatch(department_id, item_id.0, "inventory.item", &receive, |_, id| {
            InventoryItem::empty(InventoryItemId::new(id))
        })
        .unwrap();

        let mut uow = UnitOfWork::new(department_id);
        uow.stage(item_id.0, "inventory.item", stale.expected_version(), &events)
            .unwrap();
        assert!(matches!(d.commit(uow), Err(DispatchError::Concurrency(_))));
    }
}
