use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use borrowdesk_core::{DepartmentId, UserId};
use borrowdesk_events::EventEnvelope;
use borrowdesk_inventory::InventoryItemId;
use borrowdesk_lending::{
    BorrowEvent, BorrowStatus, BorrowTransactionId, InspectionStatus, ReturnTransaction,
    ReturnVerification, VerificationStatus,
};

use super::{ProjectionError, StreamCursors};
use crate::read_model::DepartmentStore;

/// Queryable borrow transaction, including its verifications and return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowReadModel {
    pub transaction_id: BorrowTransactionId,
    pub item_id: InventoryItemId,
    pub borrower_id: UserId,
    pub quantity: u32,
    pub purpose: Option<String>,
    pub expected_return_date: Option<NaiveDate>,
    pub status: BorrowStatus,
    pub requested_at: DateTime<Utc>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub verifications: Vec<ReturnVerification>,
    pub return_record: Option<ReturnTransaction>,
    pub stock_restored: bool,
    pub written_off: bool,
    pub updated_at: DateTime<Utc>,
}

/// Borrow transaction projection over `lending.borrow` envelopes.
#[derive(Debug)]
pub struct BorrowTransactionsProjection<S>
where
    S: DepartmentStore<BorrowTransactionId, BorrowReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> BorrowTransactionsProjection<S>
where
    S: DepartmentStore<BorrowTransactionId, BorrowReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(
        &self,
        department_id: DepartmentId,
        transaction_id: &BorrowTransactionId,
    ) -> Option<BorrowReadModel> {
        self.store.get(department_id, transaction_id)
    }

    /// Transactions of a department, newest request first.
    ///
    /// `borrower` narrows to one borrower's transactions, `status` to one status.
    pub fn list(
        &self,
        department_id: DepartmentId,
        borrower: Option<UserId>,
        status: Option<BorrowStatus>,
    ) -> Vec<BorrowReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list(department_id)
            .into_iter()
            .filter(|rm| borrower.is_none_or(|b| rm.borrower_id == b))
            .filter(|rm| status.is_none_or(|s| rm.status == s))
            .collect();
        rows.sort_by(|a, b| {
            b.requested_at
                .cmp(&a.requested_at)
                .then(b.transaction_id.cmp(&a.transaction_id))
        });
        rows
    }

    /// Apply a published envelope (idempotent; duplicates are ignored).
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let department_id = envelope.department_id();
        let aggregate_id = envelope.aggregate_id();

        self.cursors
            .apply_in_order(department_id, aggregate_id, envelope.sequence_number(), || {
                let event: BorrowEvent = envelope
                    .decode()
                    .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

                if event.department_id() != department_id {
                    return Err(ProjectionError::DepartmentIsolation(
                        "event department_id does not match envelope department_id".to_string(),
                    ));
                }
                if event.transaction_id().0 != aggregate_id {
                    return Err(ProjectionError::DepartmentIsolation(
                        "event transaction_id does not match envelope aggregate_id".to_string(),
                    ));
                }

                self.apply_event(department_id, event);
                Ok(())
            })
    }

    fn apply_event(&self, department_id: DepartmentId, event: BorrowEvent) {
        if let BorrowEvent::BorrowRequested(e) = &event {
            self.store.upsert(
                department_id,
                e.transaction_id,
                BorrowReadModel {
                    transaction_id: e.transaction_id,
                    item_id: e.item_id,
                    borrower_id: e.borrower_id,
                    quantity: e.quantity,
                    purpose: e.purpose.clone(),
                    expected_return_date: e.expected_return_date,
                    status: BorrowStatus::Pending,
                    requested_at: e.occurred_at,
                    approved_by: None,
                    approved_at: None,
                    rejection_reason: None,
                    verifications: Vec::new(),
                    return_record: None,
                    stock_restored: false,
                    written_off: false,
                    updated_at: e.occurred_at,
                },
            );
            return;
        }

        let Some(mut rm) = self.store.get(department_id, &event.transaction_id()) else {
            return;
        };

        match event {
            BorrowEvent::BorrowRequested(_) => {}
            BorrowEvent::BorrowApproved(e) => {
                rm.status = BorrowStatus::Borrowed;
                rm.approved_by = Some(e.approved_by);
                rm.approved_at = Some(e.occurred_at);
                rm.updated_at = e.occurred_at;
            }
            BorrowEvent::BorrowRejected(e) => {
                rm.status = BorrowStatus::Rejected;
                rm.rejection_reason = Some(e.reason);
                rm.updated_at = e.occurred_at;
            }
            BorrowEvent::ReturnSubmitted(e) => {
                rm.status = BorrowStatus::PendingReturnVerification;
                rm.verifications.push(ReturnVerification {
                    id: e.verification_id,
                    status: VerificationStatus::PendingVerification,
                    submitted_by: e.submitted_by,
                    submitted_at: e.occurred_at,
                    borrower_notes: e.notes,
                    reviewed_by: None,
                    reviewed_at: None,
                    review_notes: None,
                });
                rm.updated_at = e.occurred_at;
            }
            BorrowEvent::ReturnVerified(e) => {
                rm.status = BorrowStatus::Returned;
                if let Some(v) = rm.verifications.iter_mut().find(|v| v.id == e.verification_id) {
                    v.status = VerificationStatus::Verified;
                    v.reviewed_by = Some(e.verified_by);
                    v.reviewed_at = Some(e.occurred_at);
                    v.review_notes = e.notes;
                }
                rm.return_record = Some(ReturnTransaction {
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
                rm.updated_at = e.occurred_at;
            }
            BorrowEvent::ReturnVerificationRejected(e) => {
                rm.status = BorrowStatus::Borrowed;
                if let Some(v) = rm.verifications.iter_mut().find(|v| v.id == e.verification_id) {
                    v.status = VerificationStatus::Rejected;
                    v.reviewed_by = Some(e.rejected_by);
                    v.reviewed_at = Some(e.occurred_at);
                    v.review_notes = Some(e.reason);
                }
                rm.updated_at = e.occurred_at;
            }
            BorrowEvent::ReturnInspected(e) => {
                if let Some(r) = rm.return_record.as_mut() {
                    r.inspection_status = e.inspection_status;
                    r.condition = Some(e.condition);
                    r.inspected_by = Some(e.inspected_by);
                    r.inspected_at = Some(e.occurred_at);
                    r.inspection_notes = e.notes;
                }
                rm.stock_restored |= e.restores_stock;
                rm.updated_at = e.occurred_at;
            }
            BorrowEvent::ReturnWrittenOff(e) => {
                rm.written_off = true;
                rm.updated_at = e.occurred_at;
            }
        }

        self.store.upsert(department_id, rm.transaction_id, rm);
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

        envs.sort_by_key(|e| (e.department_id(), e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
