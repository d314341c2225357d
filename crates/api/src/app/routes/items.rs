use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use borrowdesk_auth::Permission;
use borrowdesk_core::AggregateId;
use borrowdesk_inventory::{InventoryItemId, ReceiveStock, RegisterItem};

use crate::app::routes::common::{CmdAuth, require};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{DepartmentContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_item).get(list_items))
        .route("/:id", get(get_item))
        .route("/:id/restock", post(restock))
}

pub async fn register_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    payload: Result<Json<dto::RegisterItemRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let item_id = InventoryItemId::new(AggregateId::new());

    let cmd = RegisterItem {
        department_id: department.department_id(),
        item_id,
        name: body.name,
        total_quantity: body.total_quantity,
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::ITEMS_WRITE).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.lifecycle().register_item(cmd) {
        Ok(item) => (StatusCode::CREATED, Json(dto::item_state_to_json(&item))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::RestockRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let agg = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ReceiveStock {
        department_id: department.department_id(),
        item_id: InventoryItemId::new(agg),
        quantity: body.quantity,
        occurred_at: Utc::now(),
    };

    let cmd = match CmdAuth::new(cmd, Permission::ITEMS_WRITE).authorize(&department, &principal) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.lifecycle().receive_stock(cmd) {
        Ok(item) => (StatusCode::OK, Json(dto::item_state_to_json(&item))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = require(&department, &principal, Permission::ITEMS_READ) {
        return resp;
    }

    let items = services
        .item_list(department.department_id())
        .into_iter()
        .map(dto::item_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(department): Extension<DepartmentContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&department, &principal, Permission::ITEMS_READ) {
        return resp;
    }

    let agg = match errors::parse_id(&id, "item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.item_get(department.department_id(), &InventoryItemId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::item_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "item not found"),
    }
}
