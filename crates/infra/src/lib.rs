//! Infrastructure layer: event store, command dispatch, the borrow lifecycle
//! engine and read models.

pub mod command_dispatcher;
pub mod event_store;
pub mod lifecycle;
pub mod projections;
pub mod read_model;
