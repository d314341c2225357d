//! Department-isolated read model storage abstractions.

pub mod department_store;

pub use department_store::{DepartmentStore, InMemoryDepartmentStore};
