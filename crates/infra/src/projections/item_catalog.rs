use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use borrowdesk_core::DepartmentId;
use borrowdesk_events::EventEnvelope;
use borrowdesk_inventory::{InventoryEvent, InventoryItemId, StockStatus};

use super::{ProjectionError, StreamCursors};
use crate::read_model::DepartmentStore;

/// Queryable ledger read model: stock per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReadModel {
    pub item_id: InventoryItemId,
    pub name: String,
    pub total_quantity: u32,
    pub available_quantity: u32,
    pub on_loan_quantity: u32,
    pub status: StockStatus,
    pub updated_at: DateTime<Utc>,
}

impl ItemReadModel {
    fn refresh_status(&mut self) {
        self.status = StockStatus::derive(self.available_quantity, self.total_quantity);
    }
}

/// Item catalog projection over `inventory.item` envelopes.
#[derive(Debug)]
pub struct ItemCatalogProjection<S>
where
    S: DepartmentStore<InventoryItemId, ItemReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ItemCatalogProjection<S>
where
    S: DepartmentStore<InventoryItemId, ItemReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, department_id: DepartmentId, item_id: &InventoryItemId) -> Option<ItemReadModel> {
        self.store.get(department_id, item_id)
    }

    /// All items of a department, sorted by name.
    pub fn list(&self, department_id: DepartmentId) -> Vec<ItemReadModel> {
        let mut items = self.store.list(department_id);
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.item_id.cmp(&b.item_id)));
        items
    }

    /// Apply a published envelope (idempotent; duplicates are ignored).
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let department_id = envelope.department_id();
        let aggregate_id = envelope.aggregate_id();

        self.cursors
            .apply_in_order(department_id, aggregate_id, envelope.sequence_number(), || {
                let event: InventoryEvent = envelope
                    .decode()
                    .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

                if event.department_id() != department_id {
                    return Err(ProjectionError::DepartmentIsolation(
                        "event department_id does not match envelope department_id".to_string(),
                    ));
                }
                if event.item_id().0 != aggregate_id {
                    return Err(ProjectionError::DepartmentIsolation(
                        "event item_id does not match envelope aggregate_id".to_string(),
                    ));
                }

                self.apply_event(department_id, event);
                Ok(())
            })
    }

    fn apply_event(&self, department_id: DepartmentId, event: InventoryEvent) {
        if let InventoryEvent::ItemRegistered(e) = &event {
            self.store.upsert(
                department_id,
                e.item_id,
                ItemReadModel {
                    item_id: e.item_id,
                    name: e.name.clone(),
                    total_quantity: e.total_quantity,
                    available_quantity: e.total_quantity,
                    on_loan_quantity: 0,
                    status: StockStatus::derive(e.total_quantity, e.total_quantity),
                    updated_at: e.occurred_at,
                },
            );
            return;
        }

        let Some(mut rm) = self.store.get(department_id, &event.item_id()) else {
            return;
        };

        match event {
            InventoryEvent::ItemRegistered(_) => {}
            InventoryEvent::StockReceived(e) => {
                rm.total_quantity += e.quantity;
                rm.available_quantity += e.quantity;
                rm.updated_at = e.occurred_at;
            }
            InventoryEvent::StockReservedForLoan(e) => {
                rm.available_quantity = rm.available_quantity.saturating_sub(e.quantity);
                rm.on_loan_quantity += e.quantity;
                rm.updated_at = e.occurred_at;
            }
            InventoryEvent::StockRestoredFromLoan(e) => {
                rm.available_quantity += e.quantity;
                rm.on_loan_quantity = rm.on_loan_quantity.saturating_sub(e.quantity);
                rm.updated_at = e.occurred_at;
            }
            InventoryEvent::LoanWrittenOff(e) => {
                rm.total_quantity = rm.total_quantity.saturating_sub(e.quantity);
                rm.on_loan_quantity = rm.on_loan_quantity.saturating_sub(e.quantity);
                rm.updated_at = e.occurred_at;
            }
        }

        rm.refresh_status();
        self.store.upsert(department_id, rm.item_id, rm);
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut departments = envs.iter().map(|e| e.department_id()).collect::<Vec<_>>();
        departments.sort();
        departments.dedup();
        for d in departments {
            self.store.clear_department(d);
        }

        // Deterministic replay order: department, aggregate, sequence.
        envs.sort_by_key(|e| (e.department_id(), e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
