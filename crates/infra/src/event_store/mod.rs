//! Append-only event store boundary.
//!
//! Department-scoped event streams without storage assumptions. Multi-stream
//! appends are atomic so that a borrow step and its ledger movement commit
//! together or not at all.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
