use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use borrowdesk_core::{Aggregate, AggregateId, AggregateRoot, DepartmentId, DomainError, UserId};
use borrowdesk_events::Event;
use borrowdesk_inventory::{InventoryItemId, Quantity};

use crate::inspection::{self, InspectionStatus, ItemCondition};
use crate::returns::{ReturnTransaction, ReturnTransactionId, ReturnVerification, ReturnVerificationId};
use crate::status::{BorrowStatus, VerificationStatus};

/// Borrow transaction identifier (department-scoped via `department_id` fields).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BorrowTransactionId(pub AggregateId);

impl BorrowTransactionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BorrowTransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: BorrowTransaction (one item, one borrow event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowTransaction {
    id: BorrowTransactionId,
    department_id: Option<DepartmentId>,
    item_id: Option<InventoryItemId>,
    borrower_id: Option<UserId>,
    quantity: u32,
    purpose: Option<String>,
    expected_return_date: Option<NaiveDate>,
    requested_at: Option<DateTime<Utc>>,
    status: BorrowStatus,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    verifications: Vec<ReturnVerification>,
    return_record: Option<ReturnTransaction>,
    stock_restored: bool,
    written_off: bool,
    version: u64,
    created: bool,
}

impl BorrowTransaction {
    /// Create an empty, not-yet-requested aggregate instance for rehydration.
    pub fn empty(id: BorrowTransactionId) -> Self {
        Self {
            id,
            department_id: None,
            item_id: None,
            borrower_id: None,
            quantity: 0,
            purpose: None,
            expected_return_date: None,
            requested_at: None,
            status: BorrowStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            verifications: Vec::new(),
            return_record: None,
            stock_restored: false,
            written_off: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BorrowTransactionId {
        self.id
    }

    pub fn is_requested(&self) -> bool {
        self.created
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn item_id(&self) -> Option<InventoryItemId> {
        self.item_id
    }

    pub fn borrower_id(&self) -> Option<UserId> {
        self.borrower_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    pub fn expected_return_date(&self) -> Option<NaiveDate> {
        self.expected_return_date
    }

    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    pub fn status(&self) -> BorrowStatus {
        self.status
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn verifications(&self) -> &[ReturnVerification] {
        &self.verifications
    }

    /// The verification currently awaiting review, if any.
    pub fn pending_verification(&self) -> Option<&ReturnVerification> {
        self.verifications
            .iter()
            .find(|v| v.status == VerificationStatus::PendingVerification)
    }

    pub fn return_record(&self) -> Option<&ReturnTransaction> {
        self.return_record.as_ref()
    }

    pub fn stock_restored(&self) -> bool {
        self.stock_restored
    }

    pub fn written_off(&self) -> bool {
        self.written_off
    }
}

impl AggregateRoot for BorrowTransaction {
    type Id = BorrowTransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestBorrow (does not touch stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBorrow {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub item_id: InventoryItemId,
    pub borrower_id: UserId,
    pub quantity: u32,
    pub purpose: Option<String>,
    pub expected_return_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveBorrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveBorrow {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectBorrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectBorrow {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitReturn.
///
/// `by_admin` lets an admin submit on a borrower's behalf; otherwise only
/// the borrower who owns the transaction may submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReturn {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub verification_id: ReturnVerificationId,
    pub submitted_by: UserId,
    pub by_admin: bool,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VerifyReturn (admin confirms physical receipt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReturn {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub return_id: ReturnTransactionId,
    pub verified_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectReturn (receipt could not be confirmed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReturn {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: InspectReturn (first inspection or a later edit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectReturn {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub inspected_by: UserId,
    pub inspection_status: InspectionStatus,
    pub condition: ItemCondition,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WriteOffReturn (unrestorable units leave the ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOffReturn {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub written_off_by: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorrowCommand {
    RequestBorrow(RequestBorrow),
    ApproveBorrow(ApproveBorrow),
    RejectBorrow(RejectBorrow),
    SubmitReturn(SubmitReturn),
    VerifyReturn(VerifyReturn),
    RejectReturn(RejectReturn),
    InspectReturn(InspectReturn),
    WriteOffReturn(WriteOffReturn),
}

/// Event: BorrowRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequested {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub item_id: InventoryItemId,
    pub borrower_id: UserId,
    pub quantity: u32,
    pub purpose: Option<String>,
    pub expected_return_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BorrowApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowApproved {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub item_id: InventoryItemId,
    pub quantity: u32,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BorrowRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRejected {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSubmitted {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub verification_id: ReturnVerificationId,
    pub submitted_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnVerified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnVerified {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub verification_id: ReturnVerificationId,
    pub return_id: ReturnTransactionId,
    pub verified_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnVerificationRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnVerificationRejected {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub verification_id: ReturnVerificationId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnInspected.
///
/// `restores_stock` is true only for the first restorable inspection of a
/// transaction; the ledger restore is derived from this flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnInspected {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub return_id: ReturnTransactionId,
    pub item_id: InventoryItemId,
    pub quantity: u32,
    pub inspected_by: UserId,
    pub inspection_status: InspectionStatus,
    pub condition: ItemCondition,
    pub notes: Option<String>,
    pub restores_stock: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnWrittenOff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnWrittenOff {
    pub department_id: DepartmentId,
    pub transaction_id: BorrowTransactionId,
    pub item_id: InventoryItemId,
    pub quantity: u32,
    pub written_off_by: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorrowEvent {
    BorrowRequested(BorrowRequested),
    BorrowApproved(BorrowApproved),
    BorrowRejected(BorrowRejected),
    ReturnSubmitted(ReturnSubmitted),
    ReturnVerified(ReturnVerified),
    ReturnVerificationRejected(ReturnVerificationRejected),
    ReturnInspected(ReturnInspected),
    ReturnWrittenOff(ReturnWrittenOff),
}

impl BorrowEvent {
    pub fn department_id(&self) -> DepartmentId {
        match self {
            BorrowEvent::BorrowRequested(e) => e.department_id,
            BorrowEvent::BorrowApproved(e) => e.department_id,
            BorrowEvent::BorrowRejected(e) => e.department_id,
            BorrowEvent::ReturnSubmitted(e) => e.department_id,
            BorrowEvent::ReturnVerified(e) => e.department_id,
            BorrowEvent::ReturnVerificationRejected(e) => e.department_id,
            BorrowEvent::ReturnInspected(e) => e.department_id,
            BorrowEvent::ReturnWrittenOff(e) => e.department_id,
        }
    }

    pub fn transaction_id(&self) -> BorrowTransactionId {
        match self {
            BorrowEvent::BorrowRequested(e) => e.transaction_id,
            BorrowEvent::BorrowApproved(e) => e.transaction_id,
            BorrowEvent::BorrowRejected(e) => e.transaction_id,
            BorrowEvent::ReturnSubmitted(e) => e.transaction_id,
            BorrowEvent::ReturnVerified(e) => e.transaction_id,
            BorrowEvent::ReturnVerificationRejected(e) => e.transaction_id,
            BorrowEvent::ReturnInspected(e) => e.transaction_id,
            BorrowEvent::ReturnWrittenOff(e) => e.transaction_id,
        }
    }
}

impl Event for BorrowEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BorrowEvent::BorrowRequested(_) => "lending.borrow.requested",
            BorrowEvent::BorrowApproved(_) => "lending.borrow.approved",
            BorrowEvent::BorrowRejected(_) => "lending.borrow.rejected",
            BorrowEvent::ReturnSubmitted(_) => "lending.return.submitted",
            BorrowEvent::ReturnVerified(_) => "lending.return.verified",
            BorrowEvent::ReturnVerificationRejected(_) => "lending.return.verification_rejected",
            BorrowEvent::ReturnInspected(_) => "lending.return.inspected",
            BorrowEvent::ReturnWrittenOff(_) => "lending.return.written_off",
        }
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BorrowEvent::BorrowRequested(e) => e.occurred_at,
            BorrowEvent::BorrowApproved(e) => e.occurred_at,
            BorrowEvent::BorrowRejected(e) => e.occurred_at,
            BorrowEvent::ReturnSubmitted(e) => e.occurred_at,
            BorrowEvent::ReturnVerified(e) => e.occurred_at,
            BorrowEvent::ReturnVerificationRejected(e) => e.occurred_at,
            BorrowEvent::ReturnInspected(e) => e.occurred_at,
            BorrowEvent::ReturnWrittenOff(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BorrowTransaction {
    type Command = BorrowCommand;
    type Event = BorrowEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BorrowEvent::BorrowRequested(e) => {
                self.id = e.transaction_id;
                self.department_id = Some(e.department_id);
                self.item_id = Some(e.item_id);
                self.borrower_id = Some(e.borrower_id);
                self.quantity = e.quantity;
                self.purpose = e.purpose.clone();
                self.expected_return_date = e.expected_return_date;
                self.requested_at = Some(e.occurred_at);
                self.status = BorrowStatus::Pending;
                self.created = true;
            }
            BorrowEvent::BorrowApproved(e) => {
                self.status = BorrowStatus::Borrowed;
                self.approved_by = Some(e.approved_by);
                self.approved_at = Some(e.occurred_at);
            }
            BorrowEvent::BorrowRejected(e) => {
                self.status = BorrowStatus::Rejected;
                self.rejection_reason = Some(e.reason.clone());
            }
            BorrowEvent::ReturnSubmitted(e) => {
                self.status = BorrowStatus::PendingReturnVerification;
                self.verifications.push(ReturnVerification {
                    id: e.verification_id,
                    status: VerificationStatus::PendingVerification,
                    submitted_by: e.submitted_by,
                    submitted_at: e.occurred_at,
                    borrower_notes: e.notes.clone(),
                    reviewed_by: None,
                    reviewed_at: None,
                    review_notes: None,
                });
            }
            BorrowEvent::ReturnVerified(e) => {
                self.status = BorrowStatus::Returned;
                if let Some(v) = self.verifications.iter_mut().find(|v| v.id == e.verification_id) {
                    v.status = VerificationStatus::Verified;
                    v.reviewed_by = Some(e.verified_by);
                    v.reviewed_at = Some(e.occurred_at);
                    v.review_notes = e.notes.clone();
                }
                self.return_record = Some(ReturnTransaction {
                    id: e.return_id,
                    verification_id: e.verification_id,
                    received_by: e.verified_by,
                    returned_at: e.occurred_at,
                    inspection_status: InspectionStatus::PendingInspection,
                    condition: None,
                    inspected_by: None,
                    inspected_at: None,
                    inspection_notes: None,
                });
            }
            BorrowEvent::ReturnVerificationRejected(e) => {
                self.status = BorrowStatus::Borrowed;
                if let Some(v) = self.verifications.iter_mut().find(|v| v.id == e.verification_id) {
                    v.status = VerificationStatus::Rejected;
                    v.reviewed_by = Some(e.rejected_by);
                    v.reviewed_at = Some(e.occurred_at);
                    v.review_notes = Some(e.reason.clone());
                }
            }
            BorrowEvent::ReturnInspected(e) => {
                if let Some(r) = self.return_record.as_mut() {
                    r.inspection_status = e.inspection_status;
                    r.condition = Some(e.condition);
                    r.inspected_by = Some(e.inspected_by);
                    r.inspected_at = Some(e.occurred_at);
                    r.inspection_notes = e.notes.clone();
                }
                if e.restores_stock {
                    self.stock_restored = true;
                }
            }
            BorrowEvent::ReturnWrittenOff(_) => {
                self.written_off = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BorrowCommand::RequestBorrow(cmd) => self.handle_request(cmd),
            BorrowCommand::ApproveBorrow(cmd) => self.handle_approve(cmd),
            BorrowCommand::RejectBorrow(cmd) => self.handle_reject(cmd),
            BorrowCommand::SubmitReturn(cmd) => self.handle_submit_return(cmd),
            BorrowCommand::VerifyReturn(cmd) => self.handle_verify_return(cmd),
            BorrowCommand::RejectReturn(cmd) => self.handle_reject_return(cmd),
            BorrowCommand::InspectReturn(cmd) => self.handle_inspect(cmd),
            BorrowCommand::WriteOffReturn(cmd) => self.handle_write_off(cmd),
        }
    }
}

fn normalize_text(text: &Option<String>) -> Option<String> {
    text.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_reason(reason: &str) -> Result<String, DomainError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(DomainError::validation("reason cannot be empty"));
    }
    Ok(reason.to_string())
}

impl BorrowTransaction {
    fn ensure_existing(
        &self,
        department_id: DepartmentId,
        transaction_id: BorrowTransactionId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.department_id != Some(department_id) {
            return Err(DomainError::not_found());
        }
        if self.id != transaction_id {
            return Err(DomainError::invariant("transaction_id mismatch"));
        }
        Ok(())
    }

    /// The current status must be exactly `from`, not merely one that can reach `next`.
    fn ensure_transition(
        &self,
        from: BorrowStatus,
        next: BorrowStatus,
        action: &str,
    ) -> Result<(), DomainError> {
        if self.status != from || !from.can_transition_to(next) {
            return Err(DomainError::invariant(format!(
                "cannot {action} a transaction in status {}",
                self.status
            )));
        }
        Ok(())
    }

    /// Item and borrower are set by `BorrowRequested`, so they exist once created.
    fn loan_line(&self) -> Result<InventoryItemId, DomainError> {
        self.item_id
            .ok_or_else(|| DomainError::invariant("transaction has no item"))
    }

    fn handle_request(&self, cmd: &RequestBorrow) -> Result<Vec<BorrowEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("borrow transaction already exists"));
        }
        let quantity = Quantity::new(cmd.quantity)?;

        if let Some(due) = cmd.expected_return_date {
            if due < cmd.occurred_at.date_naive() {
                return Err(DomainError::validation(
                    "expected_return_date cannot be in the past",
                ));
            }
        }

        Ok(vec![BorrowEvent::BorrowRequested(BorrowRequested {
            department_id: cmd.department_id,
            transaction_id: cmd.transaction_id,
            item_id: cmd.item_id,
            borrower_id: cmd.borrower_id,
            quantity: quantity.get(),
            purpose: normalize_text(&cmd.purpose),
            expected_return_date: cmd.expected_return_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveBorrow) -> Result<Vec<BorrowEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.transaction_id)?;
        self.ensure_transition(BorrowStatus::Pending, BorrowStatus::Borrowed, "approve")?;

        Ok(vec![BorrowEvent::BorrowApproved(BorrowApproved {
            department_id: cmd.department_id,
            transaction_id: cmd.transaction_id,
            item_id: self.loan_line()?,
            quantity: self.quantity,
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectBorrow) -> Result<Vec<BorrowEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.transaction_id)?;
        self.ensure_transition(BorrowStatus::Pending, BorrowStatus::Rejected, "reject")?;
        let reason = required_reason(&cmd.reason)?;

        Ok(vec![BorrowEvent::BorrowRejected(BorrowRejected {
            department_id: cmd.department_id,
            transaction_id: cmd.transaction_id,
            rejected_by: cmd.rejected_by,
            reason,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit_return(&self, cmd: &SubmitReturn) -> Result<Vec<BorrowEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.transaction_id)?;
        if !cmd.by_admin && self.borrower_id != Some(cmd.submitted_by) {
            return Err(DomainError::Unauthorized);
        }
        self.ensure_transition(
            BorrowStatus::Borrowed,
            BorrowStatus::PendingReturnVerification,
            "submit a return for",
        )?;

        Ok(vec![BorrowEvent::ReturnSubmitted(ReturnSubmitted {
            department_id: cmd.department_id,
            transaction_id: cmd.transaction_id,
            verification_id: cmd.verification_id,
            submitted_by: cmd.submitted_by,
            notes: normalize_text(&cmd.notes),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify_return(&self, cmd: &VerifyReturn) -> Result<Vec<BorrowEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.transaction_id)?;
        self.ensure_transition(
            BorrowStatus::PendingReturnVerification,
            BorrowStatus::Returned,
            "verify the return of",
        )?;
        let verification = self
            .pending_verification()
            .ok_or_else(|| DomainError::invariant("no return verification is pending"))?;

        Ok(vec![BorrowEvent::ReturnVerified(ReturnVerified {
            department_id: cmd.department_id,
            transaction_id: cmd.transaction_id,
            verification_id: verification.id,
            return_id: cmd.return_id,
            verified_by: cmd.verified_by,
            notes: normalize_text(&cmd.notes),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject_return(&self, cmd: &RejectReturn) -> Result<Vec<BorrowEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.transaction_id)?;
        self.ensure_transition(
            BorrowStatus::PendingReturnVerification,
            BorrowStatus::Borrowed,
            "reject the return of",
        )?;
        let verification = self
            .pending_verification()
            .ok_or_else(|| DomainError::invariant("no return verification is pending"))?;
        let reason = required_reason(&cmd.reason)?;

        Ok(vec![BorrowEvent::ReturnVerificationRejected(ReturnVerificationRejected {
            department_id: cmd.department_id,
            transaction_id: cmd.transaction_id,
            verification_id: verification.id,
            rejected_by: cmd.rejected_by,
            reason,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_inspect(&self, cmd: &InspectReturn) -> Result<Vec<BorrowEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.transaction_id)?;
        let record = match (&self.return_record, self.status) {
            (Some(record), BorrowStatus::Returned) => record,
            _ => {
                return Err(DomainError::invariant(format!(
                    "cannot inspect a transaction in status {}",
                    self.status
                )));
            }
        };
        inspection::ensure_consistent(cmd.inspection_status, cmd.condition)?;

        if self.written_off && cmd.condition.is_restorable() {
            return Err(DomainError::invariant(
                "units were written off and cannot be restored to stock",
            ));
        }

        let restores_stock = cmd.condition.is_restorable() && !self.stock_restored;

        Ok(vec![BorrowEvent::ReturnInspected(ReturnInspected {
            department_id: cmd.department_id,
            transaction_id: cmd.transaction_id,
            return_id: record.id,
            item_id: self.loan_line()?,
            quantity: self.quantity,
            inspected_by: cmd.inspected_by,
            inspection_status: cmd.inspection_status,
            condition: cmd.condition,
            notes: normalize_text(&cmd.notes),
            restores_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_write_off(&self, cmd: &WriteOffReturn) -> Result<Vec<BorrowEvent>, DomainError> {
        self.ensure_existing(cmd.department_id, cmd.transaction_id)?;
        let inspected = self
            .return_record
            .as_ref()
            .is_some_and(ReturnTransaction::is_inspected);
        if self.status != BorrowStatus::Returned || !inspected {
            return Err(DomainError::invariant("inspect the return before writing it off"));
        }
        if self.stock_restored {
            return Err(DomainError::invariant("units were already restored to stock"));
        }
        if self.written_off {
            return Err(DomainError::invariant("units were already written off"));
        }

        Ok(vec![BorrowEvent::ReturnWrittenOff(ReturnWrittenOff {
            department_id: cmd.department_id,
            transaction_id: cmd.transaction_id,
            item_id: self.loan_line()?,
            quantity: self.quantity,
            written_off_by: cmd.written_off_by,
            reason: normalize_text(&cmd.reason),
            occurred_at: cmd.occurred_at,
        })])
    }
}
