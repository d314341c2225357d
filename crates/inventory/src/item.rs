use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use borrowdesk_core::{Aggregate, AggregateId, AggregateRoot, DepartmentId, DomainError};
use borrowdesk_events::Event;

use crate::stock::{Quantity, StockStatus};

/// Inventory item identifier (department-scoped via `department_id` fields).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(pub AggregateId);

impl InventoryItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InventoryItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: InventoryItem (the stock ledger for one item).
///
/// `available + Σ on_loan == total` holds after every applied event.
/// Loans are keyed by the borrow transaction's aggregate id; a loan id
/// enters `on_loan` once (approval) and leaves it once (restore or write-off).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    department_id: Option<DepartmentId>,
    name: String,
    total: u32,
    available: u32,
    on_loan: BTreeMap<AggregateId, u32>,
    closed_loans: BTreeSet<AggregateId>,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            department_id: None,
            name: String::new(),
            total: 0,
            available: 0,
            on_loan: BTreeMap::new(),
            closed_loans: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_quantity(&self) -> u32 {
        self.total
    }

    pub fn available_quantity(&self) -> u32 {
        self.available
    }

    pub fn status(&self) -> StockStatus {
        StockStatus::derive(self.available, self.total)
    }

    /// Units currently held by the given borrow transaction, if any.
    pub fn on_loan_for(&self, loan_id: AggregateId) -> Option<u32> {
        self.on_loan.get(&loan_id).copied()
    }

    pub fn units_on_loan(&self) -> u32 {
        self.on_loan.values().sum()
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub name: String,
    pub total_quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock (new units enter the ledger as available).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveForLoan (borrow approval).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveForLoan {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub loan_id: AggregateId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestoreFromLoan (inspection found the units usable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreFromLoan {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub loan_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WriteOffLoan (units will not come back to stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOffLoan {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub loan_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RegisterItem(RegisterItem),
    ReceiveStock(ReceiveStock),
    ReserveForLoan(ReserveForLoan),
    RestoreFromLoan(RestoreFromLoan),
    WriteOffLoan(WriteOffLoan),
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub name: String,
    pub total_quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReservedForLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservedForLoan {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub loan_id: AggregateId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockRestoredFromLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRestoredFromLoan {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub loan_id: AggregateId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanWrittenOff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanWrittenOff {
    pub department_id: DepartmentId,
    pub item_id: InventoryItemId,
    pub loan_id: AggregateId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemRegistered(ItemRegistered),
    StockReceived(StockReceived),
    StockReservedForLoan(StockReservedForLoan),
    StockRestoredFromLoan(StockRestoredFromLoan),
    LoanWrittenOff(LoanWrittenOff),
}

impl InventoryEvent {
    pub fn department_id(&self) -> DepartmentId {
        match self {
            InventoryEvent::ItemRegistered(e) => e.department_id,
            InventoryEvent::StockReceived(e) => e.department_id,
            InventoryEvent::StockReservedForLoan(e) => e.department_id,
            InventoryEvent::StockRestoredFromLoan(e) => e.department_id,
            InventoryEvent::LoanWrittenOff(e) => e.department_id,
        }
    }

    pub fn item_id(&self) -> InventoryItemId {
        match self {
            InventoryEvent::ItemRegistered(e) => e.item_id,
            InventoryEvent::StockReceived(e) => e.item_id,
            InventoryEvent::StockReservedForLoan(e) => e.item_id,
            InventoryEvent::StockRestoredFromLoan(e) => e.item_id,
            InventoryEvent::LoanWrittenOff(e) => e.item_id,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemRegistered(_) => "inventory.item.registered",
            InventoryEvent::StockReceived(_) => "inventory.item.stock_received",
            InventoryEvent::StockReservedForLoan(_) => "inventory.item.reserved_for_loan",
            InventoryEvent::StockRestoredFromLoan(_) => "inventory.item.restored_from_loan",
            InventoryEvent::LoanWrittenOff(_) => "inventory.item.loan_written_off",
        }
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemRegistered(e) => e.occurred_at,
            InventoryEvent::StockReceived(e) => e.occurred_at,
            InventoryEvent::StockReservedForLoan(e) => e.occurred_at,
            InventoryEvent::StockRestoredFromLoan(e) => e.occurred_at,
            InventoryEvent::LoanWrittenOff(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.department_id = Some(e.department_id);
                self.name = e.name.clone();
                self.total = e.total_quantity;
                self.available = e.total_quantity;
                self.on_loan.clear();
                self.closed_loans.clear();
                self.created = true;
            }
            InventoryEvent::StockReceived(e) => {
                self.total += e.quantity;
                self.available += e.quantity;
            }
            InventoryEvent::StockReservedForLoan(e) => {
                self.available -= e.quantity;
                self.on_loan.insert(e.loan_id, e.quantity);
            }
            InventoryEvent::StockRestoredFromLoan(e) => {
                self.on_loan.remove(&e.loan_id);
                self.closed_loans.insert(e.loan_id);
                self.available += e.quantity;
            }
            InventoryEvent::LoanWrittenOff(e) => {
                self.on_loan.remove(&e.loan_id);
                self.closed_loans.insert(e.loan_id);
                self.total -= e.quantity;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RegisterItem(cmd) => self.handle_register(cmd),
            InventoryCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            InventoryCommand::ReserveForLoan(cmd) => self.handle_reserve(cmd),
            InventoryCommand::RestoreFromLoan(cmd) => self.handle_restore(cmd),
            InventoryCommand::WriteOffLoan(cmd) => self.handle_write_off(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_existing(
        &self,
        department_id: DepartmentId,
        item_id: InventoryItemId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        // Another department's item is indistinguishable from a missing one.
        if self.department_id != Some(department_id) {
            return Err(DomainError::not_found());
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(vec![InventoryEvent::ItemRegistered(ItemRegistered {
            department_id: cmd.department_id,
            item_id: cmd.item_id,
            name: cmd.name.trim().to_string(),
            total_quantity: cmd.total_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.item_id)?;
        let quantity = Quantity::new(cmd.quantity)?;

        if self.total.checked_add(quantity.get()).is_none() {
            return Err(DomainError::validation("total quantity would overflow"));
        }

        Ok(vec![InventoryEvent::StockReceived(StockReceived {
            department_id: cmd.department_id,
            item_id: cmd.item_id,
            quantity: quantity.get(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveForLoan) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.item_id)?;
        let quantity = Quantity::new(cmd.quantity)?;

        if self.on_loan.contains_key(&cmd.loan_id) || self.closed_loans.contains(&cmd.loan_id) {
            return Err(DomainError::invariant("stock was already reserved for this loan"));
        }

        if quantity.get() > self.available {
            return Err(DomainError::invariant(format!(
                "insufficient stock: requested {}, available {}",
                quantity, self.available
            )));
        }

        Ok(vec![InventoryEvent::StockReservedForLoan(StockReservedForLoan {
            department_id: cmd.department_id,
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            quantity: quantity.get(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreFromLoan) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.item_id)?;

        let Some(quantity) = self.on_loan_for(cmd.loan_id) else {
            return Err(DomainError::invariant(
                "no units on loan for this transaction (already restored or written off)",
            ));
        };

        Ok(vec![InventoryEvent::StockRestoredFromLoan(StockRestoredFromLoan {
            department_id: cmd.department_id,
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_write_off(&self, cmd: &WriteOffLoan) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.item_id)?;

        let Some(quantity) = self.on_loan_for(cmd.loan_id) else {
            return Err(DomainError::invariant(
                "no units on loan for this transaction (already restored or written off)",
            ));
        };

        Ok(vec![InventoryEvent::LoanWrittenOff(LoanWrittenOff {
            department_id: cmd.department_id,
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}
