//! Inventory ledger (event-sourced).
//!
//! Single source of truth for stock: every unit of an item is either
//! available or on loan to exactly one approved borrow transaction.
//! Pure domain logic (no IO, no HTTP, no storage).

pub mod item;
pub mod stock;

pub use item::{
    InventoryCommand, InventoryEvent, InventoryItem, InventoryItemId, ItemRegistered,
    LoanWrittenOff, ReceiveStock, RegisterItem, ReserveForLoan, RestoreFromLoan,
    StockReceived, StockReservedForLoan, StockRestoredFromLoan, WriteOffLoan,
};
pub use stock::{Quantity, StockStatus};
