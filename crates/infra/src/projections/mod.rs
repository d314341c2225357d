//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. They are rebuildable from the event stream, department-isolated,
//! and idempotent under at-least-once delivery.

pub mod borrow_transactions;
pub mod cursor;
pub mod item_catalog;

pub use borrow_transactions::{BorrowReadModel, BorrowTransactionsProjection};
pub use cursor::StreamCursors;
pub use item_catalog::{ItemCatalogProjection, ItemReadModel};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("department isolation violation: {0}")]
    DepartmentIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}
