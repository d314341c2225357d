use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use borrowdesk_infra::projections::{BorrowReadModel, ItemReadModel};
use borrowdesk_inventory::InventoryItem;
use borrowdesk_lending::{BorrowTransaction, InspectionStatus, ItemCondition};

// Requests

#[derive(Debug, Deserialize)]
pub struct RegisterItemRequest {
    pub name: String,
    pub total_quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct RequestBorrowRequest {
    pub item_id: String,
    pub quantity: u32,
    pub purpose: Option<String>,
    pub expected_return_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ListBorrowsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InspectionRequest {
    pub inspection_status: InspectionStatus,
    pub condition: ItemCondition,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteOffRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// Responses

pub fn item_to_json(rm: ItemReadModel) -> serde_json::Value {
    json!({
        "id": rm.item_id.0.to_string(),
        "name": rm.name,
        "total_quantity": rm.total_quantity,
        "available_quantity": rm.available_quantity,
        "on_loan_quantity": rm.on_loan_quantity,
        "status": rm.status.as_str(),
        "updated_at": rm.updated_at,
    })
}

/// Ledger state straight from the committed stream (write responses).
pub fn item_state_to_json(item: &InventoryItem) -> serde_json::Value {
    json!({
        "id": item.id_typed().0.to_string(),
        "name": item.name(),
        "total_quantity": item.total_quantity(),
        "available_quantity": item.available_quantity(),
        "on_loan_quantity": item.units_on_loan(),
        "status": item.status().as_str(),
    })
}

pub fn borrow_to_json(rm: BorrowReadModel) -> serde_json::Value {
    json!({
        "id": rm.transaction_id.0.to_string(),
        "item_id": rm.item_id.0.to_string(),
        "borrower_id": rm.borrower_id.to_string(),
        "quantity": rm.quantity,
        "purpose": rm.purpose,
        "expected_return_date": rm.expected_return_date,
        "status": rm.status.as_str(),
        "requested_at": rm.requested_at,
        "approved_by": rm.approved_by.map(|u| u.to_string()),
        "approved_at": rm.approved_at,
        "rejection_reason": rm.rejection_reason,
        "verifications": rm.verifications,
        "return": rm.return_record,
        "stock_restored": rm.stock_restored,
        "written_off": rm.written_off,
        "updated_at": rm.updated_at,
    })
}

/// Transaction state straight from the committed stream (write responses).
pub fn transaction_to_json(tx: &BorrowTransaction) -> serde_json::Value {
    json!({
        "id": tx.id_typed().0.to_string(),
        "item_id": tx.item_id().map(|i| i.0.to_string()),
        "borrower_id": tx.borrower_id().map(|u| u.to_string()),
        "quantity": tx.quantity(),
        "purpose": tx.purpose(),
        "expected_return_date": tx.expected_return_date(),
        "status": tx.status().as_str(),
        "requested_at": tx.requested_at(),
        "approved_by": tx.approved_by().map(|u| u.to_string()),
        "approved_at": tx.approved_at(),
        "rejection_reason": tx.rejection_reason(),
        "verifications": tx.verifications(),
        "return": tx.return_record(),
        "stock_restored": tx.stock_restored(),
        "written_off": tx.written_off(),
    })
}
