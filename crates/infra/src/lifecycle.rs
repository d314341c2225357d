//! Borrow/return lifecycle engine.
//!
//! Each borrow step is decided on the `BorrowTransaction` aggregate; the
//! ledger movement it implies (reserve on approval, restore on a usable
//! inspection, write-off) is derived from the emitted events and decided on
//! the `InventoryItem` aggregate. Both streams are committed in one
//! [`UnitOfWork`], so a status change and its stock movement are never
//! observed apart. Optimistic conflicts are retried by reloading and deciding
//! again.

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use borrowdesk_core::{AggregateId, DepartmentId};
use borrowdesk_events::{EventBus, EventEnvelope, execute};
use borrowdesk_inventory::{
    InventoryCommand, InventoryItem, InventoryItemId, ReceiveStock, RegisterItem, ReserveForLoan,
    RestoreFromLoan, WriteOffLoan,
};
use borrowdesk_lending::{
    ApproveBorrow, BorrowCommand, BorrowEvent, BorrowTransaction, BorrowTransactionId, InspectReturn,
    RejectBorrow, RejectReturn, RequestBorrow, SubmitReturn, VerifyReturn, WriteOffReturn,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, UnitOfWork};
use crate::event_store::EventStore;

pub const ITEM_AGGREGATE: &str = "inventory.item";
pub const BORROW_AGGREGATE: &str = "lending.borrow";

/// Attempts per step before an optimistic conflict is surfaced.
const MAX_ATTEMPTS: u32 = 3;

/// State after a committed borrow step.
///
/// `item` is present when the step moved stock.
#[derive(Debug, Clone)]
pub struct BorrowOutcome {
    pub transaction: BorrowTransaction,
    pub item: Option<InventoryItem>,
}

pub struct BorrowLifecycle<S, B> {
    dispatcher: CommandDispatcher<S, B>,
}

impl<S, B> BorrowLifecycle<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>) -> Self {
        Self { dispatcher }
    }

    // Ledger

    pub fn register_item(&self, cmd: RegisterItem) -> Result<InventoryItem, DispatchError> {
        let (department_id, item_id) = (cmd.department_id, cmd.item_id);
        self.item_step(department_id, item_id, InventoryCommand::RegisterItem(cmd), "register_item")
    }

    pub fn receive_stock(&self, cmd: ReceiveStock) -> Result<InventoryItem, DispatchError> {
        let (department_id, item_id) = (cmd.department_id, cmd.item_id);
        self.item_step(department_id, item_id, InventoryCommand::ReceiveStock(cmd), "receive_stock")
    }

    /// Current ledger state of one item, read from its stream.
    pub fn item(&self, department_id: DepartmentId, item_id: InventoryItemId) -> Result<InventoryItem, DispatchError> {
        let loaded = self.dispatcher.load(department_id, item_id.0, |_, id| {
            InventoryItem::empty(InventoryItemId::new(id))
        })?;
        if !loaded.aggregate.is_registered() {
            return Err(DispatchError::NotFound);
        }
        Ok(loaded.aggregate)
    }

    // Borrow transactions

    /// Create a pending borrow request. Stock is not touched.
    pub fn request_borrow(&self, cmd: RequestBorrow) -> Result<BorrowOutcome, DispatchError> {
        let item = self.item(cmd.department_id, cmd.item_id)?;
        if cmd.quantity > item.total_quantity() {
            return Err(DispatchError::Validation(format!(
                "requested quantity {} exceeds total quantity {}",
                cmd.quantity,
                item.total_quantity()
            )));
        }

        let (department_id, transaction_id) = (cmd.department_id, cmd.transaction_id);
        self.borrow_step(department_id, transaction_id, BorrowCommand::RequestBorrow(cmd), "request")
    }

    /// `pending → borrowed`, reserving the requested units.
    pub fn approve(&self, cmd: ApproveBorrow) -> Result<BorrowOutcome, DispatchError> {
        let (department_id, transaction_id) = (cmd.department_id, cmd.transaction_id);
        self.borrow_step(department_id, transaction_id, BorrowCommand::ApproveBorrow(cmd), "approve")
    }

    /// `pending → rejected`.
    pub fn reject(&self, cmd: RejectBorrow) -> Result<BorrowOutcome, DispatchError> {
        let (department_id, transaction_id) = (cmd.department_id, cmd.transaction_id);
        self.borrow_step(department_id, transaction_id, BorrowCommand::RejectBorrow(cmd), "reject")
    }

    /// `borrowed → pending_return_verification`.
    pub fn submit_return(&self, cmd: SubmitReturn) -> Result<BorrowOutcome, DispatchError> {
        let (department_id, transaction_id) = (cmd.department_id, cmd.transaction_id);
        self.borrow_step(department_id, transaction_id, BorrowCommand::SubmitReturn(cmd), "submit_return")
    }

    /// `pending_return_verification → returned`, opening the inspection.
    pub fn verify_return(&self, cmd: VerifyReturn) -> Result<BorrowOutcome, DispatchError> {
        let (department_id, transaction_id) = (cmd.department_id, cmd.transaction_id);
        self.borrow_step(department_id, transaction_id, BorrowCommand::VerifyReturn(cmd), "verify_return")
    }

    /// `pending_return_verification → borrowed`.
    pub fn reject_return(&self, cmd: RejectReturn) -> Result<BorrowOutcome, DispatchError> {
        let (department_id, transaction_id) = (cmd.department_id, cmd.transaction_id);
        self.borrow_step(department_id, transaction_id, BorrowCommand::RejectReturn(cmd), "reject_return")
    }

    /// Record (or edit) an inspection; the first usable outcome restores stock.
    pub fn inspect(&self, cmd: InspectReturn) -> Result<BorrowOutcome, DispatchError> {
        let (department_id, transaction_id) = (cmd.department_id, cmd.transaction_id);
        self.borrow_step(department_id, transaction_id, BorrowCommand::InspectReturn(cmd), "inspect")
    }

    /// Remove unrestorable units from the ledger.
    pub fn write_off(&self, cmd: WriteOffReturn) -> Result<BorrowOutcome, DispatchError> {
        let (department_id, transaction_id) = (cmd.department_id, cmd.transaction_id);
        self.borrow_step(department_id, transaction_id, BorrowCommand::WriteOffReturn(cmd), "write_off")
    }

    /// Current state of one borrow transaction, read from its stream.
    pub fn transaction(
        &self,
        department_id: DepartmentId,
        transaction_id: BorrowTransactionId,
    ) -> Result<BorrowTransaction, DispatchError> {
        let loaded = self.dispatcher.load(department_id, transaction_id.0, |_, id| {
            BorrowTransaction::empty(BorrowTransactionId::new(id))
        })?;
        if !loaded.aggregate.is_requested() {
            return Err(DispatchError::NotFound);
        }
        Ok(loaded.aggregate)
    }

    fn item_step(
        &self,
        department_id: DepartmentId,
        item_id: InventoryItemId,
        command: InventoryCommand,
        step: &'static str,
    ) -> Result<InventoryItem, DispatchError> {
        let item = with_retry(step, || {
            self.dispatcher
                .dispatch(department_id, item_id.0, ITEM_AGGREGATE, &command, |_, id| {
                    InventoryItem::empty(InventoryItemId::new(id))
                })
        })?;

        info!(
            %department_id,
            %item_id,
            step,
            total = item.total_quantity(),
            available = item.available_quantity(),
            "ledger step committed"
        );
        Ok(item)
    }

    fn borrow_step(
        &self,
        department_id: DepartmentId,
        transaction_id: BorrowTransactionId,
        command: BorrowCommand,
        step: &'static str,
    ) -> Result<BorrowOutcome, DispatchError> {
        let outcome = with_retry(step, || {
            let mut tx = self.dispatcher.load(department_id, transaction_id.0, |_, id| {
                BorrowTransaction::empty(BorrowTransactionId::new(id))
            })?;
            let tx_expected = tx.expected_version();
            let events = execute(&mut tx.aggregate, &command)?;

            let mut uow = UnitOfWork::new(department_id);
            uow.stage(transaction_id.0, BORROW_AGGREGATE, tx_expected, &events)?;

            let mut item_after = None;
            if let Some((item_id, ledger_command)) = ledger_command_for(&events, transaction_id.0) {
                let mut item = self.dispatcher.load(department_id, item_id.0, |_, id| {
                    InventoryItem::empty(InventoryItemId::new(id))
                })?;
                let item_expected = item.expected_version();
                let item_events = execute(&mut item.aggregate, &ledger_command)?;
                uow.stage(item_id.0, ITEM_AGGREGATE, item_expected, &item_events)?;
                item_after = Some(item.aggregate);
            }

            self.dispatcher.commit(uow)?;
            Ok(BorrowOutcome {
                transaction: tx.aggregate,
                item: item_after,
            })
        })?;

        info!(
            %department_id,
            %transaction_id,
            step,
            status = %outcome.transaction.status(),
            available = ?outcome.item.as_ref().map(InventoryItem::available_quantity),
            "borrow step committed"
        );
        Ok(outcome)
    }
}

fn with_retry<T>(
    step: &'static str,
    mut attempt_once: impl FnMut() -> Result<T, DispatchError>,
) -> Result<T, DispatchError> {
    let mut attempt = 1;
    loop {
        match attempt_once() {
            Err(DispatchError::Concurrency(reason)) if attempt < MAX_ATTEMPTS => {
                warn!(step, attempt, %reason, "optimistic conflict, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// The ledger command implied by a borrow step, if any.
fn ledger_command_for(
    events: &[BorrowEvent],
    loan_id: AggregateId,
) -> Option<(InventoryItemId, InventoryCommand)> {
    events.iter().find_map(|event| match event {
        BorrowEvent::BorrowApproved(e) => Some((
            e.item_id,
            InventoryCommand::ReserveForLoan(ReserveForLoan {
                department_id: e.department_id,
                item_id: e.item_id,
                loan_id,
                quantity: e.quantity,
                occurred_at: e.occurred_at,
            }),
        )),
        BorrowEvent::ReturnInspected(e) if e.restores_stock => Some((
            e.item_id,
            InventoryCommand::RestoreFromLoan(RestoreFromLoan {
                department_id: e.department_id,
                item_id: e.item_id,
                loan_id,
                occurred_at: e.occurred_at,
            }),
        )),
        BorrowEvent::ReturnWrittenOff(e) => Some((
            e.item_id,
            InventoryCommand::WriteOffLoan(WriteOffLoan {
                department_id: e.department_id,
                item_id: e.item_id,
                loan_id,
                occurred_at: e.occurred_at,
            }),
        )),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use borrowdesk_core::UserId;
    use borrowdesk_events::InMemoryEventBus;
    use borrowdesk_lending::{
        BorrowStatus, InspectionStatus, ItemCondition, ReturnTransactionId, ReturnVerificationId,
    };
    use chrono::Utc;

    use crate::event_store::InMemoryEventStore;

    type Lifecycle = BorrowLifecycle<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    struct Desk {
        lifecycle: Lifecycle,
        department_id: DepartmentId,
        admin: UserId,
        borrower: UserId,
    }

    impl Desk {
        fn new() -> Self {
            let dispatcher = CommandDispatcher::new(
                Arc::new(InMemoryEventStore::new()),
                Arc::new(InMemoryEventBus::new()),
            );
            Self {
                lifecycle: BorrowLifecycle::new(dispatcher),
                department_id: DepartmentId::new(),
                admin: UserId::new(),
                borrower: UserId::new(),
            }
        }

        fn item(&self, total: u32) -> InventoryItemId {
            let item_id = InventoryItemId::new(AggregateId::new());
            self.lifecycle
                .register_item(RegisterItem {
                    department_id: self.department_id,
                    item_id,
                    name: "Multimeter".to_string(),
                    total_quantity: total,
                    occurred_at: Utc::now(),
                })
                .unwrap();
            item_id
        }

        fn request(&self, item_id: InventoryItemId, quantity: u32) -> Result<BorrowTransactionId, DispatchError> {
            let transaction_id = BorrowTransactionId::new(AggregateId::new());
            self.lifecycle.request_borrow(RequestBorrow {
                department_id: self.department_id,
                transaction_id,
                item_id,
                borrower_id: self.borrower,
                quantity,
                purpose: None,
                expected_return_date: None,
                occurred_at: Utc::now(),
            })?;
            Ok(transaction_id)
        }

        fn approve(&self, transaction_id: BorrowTransactionId) -> Result<BorrowOutcome, DispatchError> {
            self.lifecycle.approve(ApproveBorrow {
                department_id: self.department_id,
                transaction_id,
                approved_by: self.admin,
                occurred_at: Utc::now(),
            })
        }

        fn returned(&self, transaction_id: BorrowTransactionId) {
            self.lifecycle
                .submit_return(SubmitReturn {
                    department_id: self.department_id,
                    transaction_id,
                    verification_id: ReturnVerificationId::new(),
                    submitted_by: self.borrower,
                    by_admin: false,
                    notes: None,
                    occurred_at: Utc::now(),
                })
                .unwrap();
            self.lifecycle
                .verify_return(VerifyReturn {
                    department_id: self.department_id,
                    transaction_id,
                    return_id: ReturnTransactionId::new(),
                    verified_by: self.admin,
                    notes: None,
                    occurred_at: Utc::now(),
                })
                .unwrap();
        }

        fn inspect(
            &self,
            transaction_id: BorrowTransactionId,
            status: InspectionStatus,
            condition: ItemCondition,
        ) -> Result<BorrowOutcome, DispatchError> {
            self.lifecycle.inspect(InspectReturn {
                department_id: self.department_id,
                transaction_id,
                inspected_by: self.admin,
                inspection_status: status,
                condition,
                notes: None,
                occurred_at: Utc::now(),
            })
        }

        fn available(&self, item_id: InventoryItemId) -> u32 {
            self.lifecycle
                .item(self.department_id, item_id)
                .unwrap()
                .available_quantity()
        }
    }

    #[test]
    fn request_does_not_touch_stock_and_checks_item() {
        let desk = Desk::new();
        let item_id = desk.item(3);

        desk.request(item_id, 2).unwrap();
        assert_eq!(desk.available(item_id), 3);

        let missing = InventoryItemId::new(AggregateId::new());
        assert!(matches!(desk.request(missing, 1), Err(DispatchError::NotFound)));
        assert!(matches!(desk.request(item_id, 4), Err(DispatchError::Validation(_))));
        assert!(matches!(desk.request(item_id, 0), Err(DispatchError::Validation(_))));
    }

    #[test]
    fn approval_reserves_stock_atomically() {
        let desk = Desk::new();
        let item_id = desk.item(5);
        let tx = desk.request(item_id, 2).unwrap();

        let outcome = desk.approve(tx).unwrap();
        assert_eq!(outcome.transaction.status(), BorrowStatus::Borrowed);
        assert_eq!(outcome.item.unwrap().available_quantity(), 3);
        assert_eq!(desk.available(item_id), 3);
    }

    #[test]
    fn insufficient_stock_leaves_both_streams_untouched() {
        let desk = Desk::new();
        let item_id = desk.item(2);
        let first = desk.request(item_id, 2).unwrap();
        let second = desk.request(item_id, 1).unwrap();
        desk.approve(first).unwrap();

        let err = desk.approve(second).unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(ref m) if m.contains("insufficient stock")));
        let tx = desk.lifecycle.transaction(desk.department_id, second).unwrap();
        assert_eq!(tx.status(), BorrowStatus::Pending);
        assert_eq!(desk.available(item_id), 0);
    }

    #[test]
    fn full_cycle_restores_exactly_once() {
        let desk = Desk::new();
        let item_id = desk.item(4);
        let tx = desk.request(item_id, 3).unwrap();
        desk.approve(tx).unwrap();
        desk.returned(tx);
        assert_eq!(desk.available(item_id), 1);

        let outcome = desk
            .inspect(tx, InspectionStatus::MinorDamage, ItemCondition::Fair)
            .unwrap();
        assert_eq!(outcome.item.unwrap().available_quantity(), 4);

        // Edits never move stock again.
        let edit = desk
            .inspect(tx, InspectionStatus::GoodCondition, ItemCondition::Excellent)
            .unwrap();
        assert!(edit.item.is_none());
        desk.inspect(tx, InspectionStatus::MajorDamage, ItemCondition::Damaged)
            .unwrap();
        assert_eq!(desk.available(item_id), 4);
    }

    #[test]
    fn damaged_units_stay_out_until_written_off() {
        let desk = Desk::new();
        let item_id = desk.item(3);
        let tx = desk.request(item_id, 1).unwrap();
        desk.approve(tx).unwrap();
        desk.returned(tx);

        let outcome = desk.inspect(tx, InspectionStatus::Lost, ItemCondition::Lost).unwrap();
        assert!(outcome.item.is_none());
        assert_eq!(desk.available(item_id), 2);

        let written = desk
            .lifecycle
            .write_off(WriteOffReturn {
                department_id: desk.department_id,
                transaction_id: tx,
                written_off_by: desk.admin,
                reason: None,
                occurred_at: Utc::now(),
            })
            .unwrap();
        let item = written.item.unwrap();
        assert_eq!(item.total_quantity(), 2);
        assert_eq!(item.available_quantity(), 2);

        let err = desk
            .inspect(tx, InspectionStatus::GoodCondition, ItemCondition::Good)
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
    }

    #[test]
    fn other_departments_cannot_act_on_a_transaction() {
        let desk = Desk::new();
        let item_id = desk.item(1);
        let tx = desk.request(item_id, 1).unwrap();

        let err = desk
            .lifecycle
            .approve(ApproveBorrow {
                department_id: DepartmentId::new(),
                transaction_id: tx,
                approved_by: desk.admin,
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry("test", || {
            calls += 1;
            Err(DispatchError::Concurrency("stale".to_string()))
        });
        assert!(matches!(result, Err(DispatchError::Concurrency(_))));
        assert_eq!(calls, MAX_ATTEMPTS);

        let mut calls = 0;
        let result = with_retry("test", || {
            calls += 1;
            if calls == 1 {
                Err(DispatchError::Concurrency("stale".to_string()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }
}
