use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use borrowdesk_auth::Permission;
use borrowdesk_core::AggregateId;
use borrowdesk_infra::{command_dispatcher::DispatchError, lifecycle::BorrowOutcome};
use borrowdesk_inventory::InventoryItemId;
use borrowdesk_lending::{
    ApproveBorrow, BorrowStatus, BorrowTransactionId, InspectReturn, RejectBorrow, RejectReturn, RequestBorrow,
    ReturnTransactionId, ReturnVerificationId, SubmitReturn, VerifyReturn, WriteOffReturn,
};

use crate::app::routes::common::{CmdAuth, require};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::resolve_principal;
use crate::context::{DepartmentContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(request_borrow).get(list_borrows))
        .route("/:id", get(get_borrow))
        .route("/:id/approve", post(approve))
        .route("/:id/reject", post(reject))
        .route("/:id/return", post(submit_return))
        .route("/:id/verification/verify", post(verify_return))
        .route("/:id/verification/reject", post(reject_return))
        .route("/:id/inspection", post(inspect))
        .route("/:id/write-off", post(write_off))
}

fn parse_transaction_id(id: &str) -> Result<BorrowTransactionId, axum::response::Response> {
    errors::parse_id(id, "borrow transaction").map(BorrowTransactionId::new)
}

fn outcome_response(status: StatusCode, result: Result<BorrowOutcome, DispatchError>) -> axum::response::Response {
    match result {
        Ok(outcome) => (
            status,
            Json(serde_json::json!({
                "transaction": dto::transaction_to_json(&outcome.transaction),
                "item": outcome.item.as_ref().map(dto::item_state_to_json),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn request_borrow(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    payload: Result<Json<dto::RequestBorrowRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let item_agg: AggregateId = match errors::parse_id(&body.item_id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = RequestBorrow {
        department_id: department.department_id(),
        transaction_id: BorrowTransactionId::new(AggregateId::new()),
        item_id: InventoryItemId::new(item_agg),
        borrower_id: principal.user_id(),
        quantity: body.quantity,
        purpose: body.purpose,
        expected_return_date: body.expected_return_date,
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::BORROWS_REQUEST).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    outcome_response(StatusCode::CREATED, services.lifecycle().request_borrow(cmd))
}

pub async fn list_borrows(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListBorrowsQuery>,
) -> axum::response::Response {
    if let Err(resp) = require(&department, &principal, Permission::BORROWS_READ) {
        return resp;
    }

    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match BorrowStatus::parse(raw) {
            Some(s) => Some(s),
            None => {
                return errors::json_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "validation_error",
                    format!("unknown status `{raw}`"),
                );
            }
        },
    };

    // Borrowers only ever see their own transactions.
    let sees_all = resolve_principal(&department, &principal).has(&Permission::BORROWS_READ_ALL);
    let borrower = (!sees_all).then(|| principal.user_id());

    let borrows = services
        .borrow_list(department.department_id(), borrower, status)
        .into_iter()
        .map(dto::borrow_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": borrows }))).into_response()
}

pub async fn get_borrow(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&department, &principal, Permission::BORROWS_READ) {
        return resp;
    }

    let transaction_id = match parse_transaction_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let Some(rm) = services.borrow_get(department.department_id(), &transaction_id) else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "borrow transaction not found");
    };

    let sees_all = resolve_principal(&department, &principal).has(&Permission::BORROWS_READ_ALL);
    if !sees_all && rm.borrower_id != principal.user_id() {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "only the borrower or an admin may view this transaction",
        );
    }

    (StatusCode::OK, Json(dto::borrow_to_json(rm))).into_response()
}

pub async fn approve(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let transaction_id = match parse_transaction_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ApproveBorrow {
        department_id: department.department_id(),
        transaction_id,
        approved_by: principal.user_id(),
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::BORROWS_APPROVE).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    outcome_response(StatusCode::OK, services.lifecycle().approve(cmd))
}

pub async fn reject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::ReasonRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let transaction_id = match parse_transaction_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = RejectBorrow {
        department_id: department.department_id(),
        transaction_id,
        rejected_by: principal.user_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::BORROWS_APPROVE).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    outcome_response(StatusCode::OK, services.lifecycle().reject(cmd))
}

pub async fn submit_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    raw: Bytes,
) -> axum::response::Response {
    let body: dto::NotesRequest = match errors::optional_json_body(&raw) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let transaction_id = match parse_transaction_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Ownership is checked by the aggregate; admins may submit on a borrower's behalf.
    let cmd = SubmitReturn {
        department_id: department.department_id(),
        transaction_id,
        verification_id: ReturnVerificationId::new(),
        submitted_by: principal.user_id(),
        by_admin: principal.is_admin(),
        notes: body.notes,
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::BORROWS_RETURN).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    outcome_response(StatusCode::OK, services.lifecycle().submit_return(cmd))
}

pub async fn verify_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    raw: Bytes,
) -> axum::response::Response {
    let body: dto::NotesRequest = match errors::optional_json_body(&raw) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let transaction_id = match parse_transaction_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = VerifyReturn {
        department_id: department.department_id(),
        transaction_id,
        return_id: ReturnTransactionId::new(),
        verified_by: principal.user_id(),
        notes: body.notes,
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::RETURNS_VERIFY).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    outcome_response(StatusCode::OK, services.lifecycle().verify_return(cmd))
}

pub async fn reject_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::ReasonRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let transaction_id = match parse_transaction_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = RejectReturn {
        department_id: department.department_id(),
        transaction_id,
        rejected_by: principal.user_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::RETURNS_VERIFY).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    outcome_response(StatusCode::OK, services.lifecycle().reject_return(cmd))
}

pub async fn inspect(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::InspectionRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let transaction_id = match parse_transaction_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = InspectReturn {
        department_id: department.department_id(),
        transaction_id,
        inspected_by: principal.user_id(),
        inspection_status: body.inspection_status,
        condition: body.condition,
        notes: body.notes,
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::RETURNS_INSPECT).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    outcome_response(StatusCode::OK, services.lifecycle().inspect(cmd))
}

pub async fn write_off(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    raw: Bytes,
) -> axum::response::Response {
    let body: dto::WriteOffRequest = match errors::optional_json_body(&raw) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let transaction_id = match parse_transaction_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = WriteOffReturn {
        department_id: department.department_id(),
        transaction_id,
        written_off_by: principal.user_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::RETURNS_INSPECT).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    outcome_response(StatusCode::OK, services.lifecycle().write_off(cmd))
}
