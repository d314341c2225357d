//! In-process infrastructure wiring: event store, bus, lifecycle engine and
//! the projections feeding read endpoints.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use borrowdesk_core::{DepartmentId, UserId};
use borrowdesk_events::{EventBus, EventEnvelope, InMemoryEventBus};
use borrowdesk_infra::{
    event_store::InMemoryEventStore,
    lifecycle::{BORROW_AGGREGATE, BorrowLifecycle, ITEM_AGGREGATE},
    command_dispatcher::CommandDispatcher,
    projections::{BorrowReadModel, BorrowTransactionsProjection, ItemCatalogProjection, ItemReadModel},
    read_model::InMemoryDepartmentStore,
};
use borrowdesk_inventory::InventoryItemId;
use borrowdesk_lending::{BorrowStatus, BorrowTransactionId};

pub type Store = Arc<InMemoryEventStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Lifecycle = BorrowLifecycle<Store, Bus>;

type ItemCatalog = ItemCatalogProjection<Arc<InMemoryDepartmentStore<InventoryItemId, ItemReadModel>>>;
type BorrowBook = BorrowTransactionsProjection<Arc<InMemoryDepartmentStore<BorrowTransactionId, BorrowReadModel>>>;

pub struct AppServices {
    lifecycle: Lifecycle,
    items: Arc<ItemCatalog>,
    borrows: Arc<BorrowBook>,
}

/// Wire store + bus + projections and start the projection task.
///
/// Must be called from within a tokio runtime.
pub fn build_services() -> AppServices {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let items: Arc<ItemCatalog> = Arc::new(ItemCatalogProjection::new(Arc::new(InMemoryDepartmentStore::new())));
    let borrows: Arc<BorrowBook> =
        Arc::new(BorrowTransactionsProjection::new(Arc::new(InMemoryDepartmentStore::new())));

    // Subscribe before any command can publish.
    let sub = bus.subscribe();
    {
        let items = items.clone();
        let borrows = borrows.clone();
        tokio::task::spawn_blocking(move || {
            for env in sub {
                let applied = match env.aggregate_type() {
                    ITEM_AGGREGATE => items.apply_envelope(&env),
                    BORROW_AGGREGATE => borrows.apply_envelope(&env),
                    _ => Ok(()),
                };

                if let Err(e) = applied {
                    tracing::warn!(
                        aggregate_type = env.aggregate_type(),
                        aggregate_id = %env.aggregate_id(),
                        sequence_number = env.sequence_number(),
                        "projection apply failed: {e}"
                    );
                }
            }
            tracing::info!("event bus closed; projection task exiting");
        });
    }

    let dispatcher = CommandDispatcher::new(store, bus);
    AppServices {
        lifecycle: BorrowLifecycle::new(dispatcher),
        items,
        borrows,
    }
}

impl AppServices {
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn item_get(&self, department_id: DepartmentId, item_id: &InventoryItemId) -> Option<ItemReadModel> {
        self.items.get(department_id, item_id)
    }

    pub fn item_list(&self, department_id: DepartmentId) -> Vec<ItemReadModel> {
        self.items.list(department_id)
    }

    pub fn borrow_get(
        &self,
        department_id: DepartmentId,
        transaction_id: &BorrowTransactionId,
    ) -> Option<BorrowReadModel> {
        self.borrows.get(department_id, transaction_id)
    }

    pub fn borrow_list(
        &self,
        department_id: DepartmentId,
        borrower: Option<UserId>,
        status: Option<BorrowStatus>,
    ) -> Vec<BorrowReadModel> {
        self.borrows.list(department_id, borrower, status)
    }
}
