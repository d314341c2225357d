use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use borrowdesk_core::{AggregateId, DepartmentId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    department_id: DepartmentId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Global commit order, used by `load_all`.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single `RwLock` serializes writers, which is
/// what makes multi-stream appends atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

/// Check that a stream's batch targets exactly one stream; returns its key and type.
fn stream_of(events: &[UncommittedEvent]) -> Result<Option<(StreamKey, String)>, EventStoreError> {
    let Some(first) = events.first() else {
        return Ok(None);
    };

    for (idx, e) in events.iter().enumerate() {
        if e.department_id != first.department_id {
            return Err(EventStoreError::DepartmentIsolation(format!(
                "batch contains multiple department_ids (index {idx})"
            )));
        }
        if e.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "batch contains multiple aggregate_types (index {idx})"
            )));
        }
    }

    let key = StreamKey {
        department_id: first.department_id,
        aggregate_id: first.aggregate_id,
    };
    Ok(Some((key, first.aggregate_type.clone())))
}

impl EventStore for InMemoryEventStore {
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut plan = Vec::with_capacity(batch.len());
        let mut seen = HashSet::new();
        for append in batch {
            let Some((key, aggregate_type)) = stream_of(&append.events)? else {
                continue;
            };
            if !seen.insert(key) {
                return Err(EventStoreError::InvalidAppend(
                    "a stream may appear only once per batch".to_string(),
                ));
            }
            plan.push((key, aggregate_type, append));
        }

        if plan.is_empty() {
            return Ok(vec![]);
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        // Check every stream before touching any of them.
        for (key, aggregate_type, append) in &plan {
            let stream = inner.streams.get(key).map(Vec::as_slice).unwrap_or(&[]);
            let current = Self::current_version(stream);

            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    key.aggregate_id, append.expected_version
                )));
            }

            if let Some(existing) = stream.first() {
                if &existing.aggregate_type != aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, aggregate_type
                    )));
                }
            }
        }

        let mut committed = Vec::new();
        for (key, _, append) in plan {
            let stream = inner.streams.entry(key).or_default();
            let mut next = Self::current_version(stream) + 1;
            let mut stored_batch = Vec::with_capacity(append.events.len());
            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    department_id: e.department_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                stored_batch.push(stored);
            }
            inner.log.extend(stored_batch.iter().cloned());
            committed.extend(stored_batch);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        department_id: DepartmentId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            department_id,
            aggregate_id,
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        Ok(inner.log.clone())
    }
}
