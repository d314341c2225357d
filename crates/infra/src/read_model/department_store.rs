//! Storage behind the read-model projections.
//!
//! Rows are partitioned by department first, so a lookup can never reach
//! another department's data and a rebuild drops one partition wholesale.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

use borrowdesk_core::DepartmentId;

/// Keyed rows of one read model, partitioned per department.
///
/// Rows are disposable: projections overwrite them on every event and
/// rebuild them from the event store.
pub trait DepartmentStore<K, V>: Send + Sync {
    fn get(&self, department_id: DepartmentId, key: &K) -> Option<V>;
    fn upsert(&self, department_id: DepartmentId, key: K, value: V);
    /// Every row of one department, in no particular order.
    fn list(&self, department_id: DepartmentId) -> Vec<V>;
    fn clear_department(&self, department_id: DepartmentId);
}

impl<K, V, S> DepartmentStore<K, V> for Arc<S>
where
    S: DepartmentStore<K, V> + ?Sized,
{
    fn get(&self, department_id: DepartmentId, key: &K) -> Option<V> {
        S::get(self, department_id, key)
    }

    fn upsert(&self, department_id: DepartmentId, key: K, value: V) {
        S::upsert(self, department_id, key, value)
    }

    fn list(&self, department_id: DepartmentId) -> Vec<V> {
        S::list(self, department_id)
    }

    fn clear_department(&self, department_id: DepartmentId) {
        S::clear_department(self, department_id)
    }
}

type Partitions<K, V> = HashMap<DepartmentId, HashMap<K, V>>;

/// Process-local [`DepartmentStore`]; the only backend the service ships.
#[derive(Debug)]
pub struct InMemoryDepartmentStore<K, V> {
    partitions: RwLock<Partitions<K, V>>,
}

impl<K, V> InMemoryDepartmentStore<K, V> {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryDepartmentStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> DepartmentStore<K, V> for InMemoryDepartmentStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, department_id: DepartmentId, key: &K) -> Option<V> {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        partitions.get(&department_id)?.get(key).cloned()
    }

    fn upsert(&self, department_id: DepartmentId, key: K, value: V) {
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        partitions.entry(department_id).or_default().insert(key, value);
    }

    fn list(&self, department_id: DepartmentId) -> Vec<V> {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        partitions
            .get(&department_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn clear_department(&self, department_id: DepartmentId) {
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        partitions.remove(&department_id);
    }
}
