use chrono::{Duration as ChronoDuration, Utc};
use borrowdesk_auth::{JwtClaims, PrincipalId, Role};
use borrowdesk_core::DepartmentId;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = borrowdesk_api::app::build_app(SECRET.to_string()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// POST without a body or content type, as a bare `curl -X POST` would.
    async fn post_empty(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Read endpoints are eventually consistent; poll until `check` holds.
    async fn get_eventually(&self, token: &str, path: &str, check: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..50 {
            let (status, body) = self.get(token, path).await;
            if status == StatusCode::OK && check(&body) {
                return body;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("{path} did not converge within timeout");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Actor {
    token: String,
    id: PrincipalId,
}

fn mint_jwt_at(
    department_id: DepartmentId,
    roles: Vec<Role>,
    issued_at: chrono::DateTime<Utc>,
    secret: &str,
) -> Actor {
    let id = PrincipalId::new();
    let claims = JwtClaims {
        sub: id,
        department_id,
        roles,
        issued_at,
        expires_at: issued_at + ChronoDuration::minutes(10),
    };

    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt");
    Actor { token, id }
}

fn mint_jwt(department_id: DepartmentId, roles: Vec<Role>) -> Actor {
    mint_jwt_at(department_id, roles, Utc::now(), SECRET)
}

async fn register_item(srv: &TestServer, admin: &Actor, name: &str, total: u32) -> String {
    let (status, body) = srv
        .post(&admin.token, "/api/items", json!({ "name": name, "total_quantity": total }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn request_borrow(srv: &TestServer, borrower: &Actor, item_id: &str, quantity: u32) -> String {
    let (status, body) = srv
        .post(
            &borrower.token,
            "/api/borrows",
            json!({ "item_id": item_id, "quantity": quantity, "purpose": "lab session" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["transaction"]["status"], "pending");
    body["transaction"]["id"].as_str().unwrap().to_string()
}

/// Approve, submit, verify: leaves the transaction `returned` and awaiting inspection.
async fn borrow_and_hand_back(srv: &TestServer, admin: &Actor, borrower: &Actor, tx: &str) {
    let (status, _) = srv.post(&admin.token, &format!("/api/borrows/{tx}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = srv
        .post(&borrower.token, &format!("/api/borrows/{tx}/return"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = srv
        .post(&admin.token, &format!("/api/borrows/{tx}/verification/verify"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(format!("{}/api/whoami", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let forged = mint_jwt_at(DepartmentId::new(), vec![Role::ADMIN], Utc::now(), "other-secret");
    let (status, _) = srv.get(&forged.token, "/api/whoami").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = mint_jwt_at(
        DepartmentId::new(),
        vec![Role::ADMIN],
        Utc::now() - ChronoDuration::hours(1),
        SECRET,
    );
    let (status, _) = srv.get(&expired.token, "/api/whoami").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let res = srv.client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn department_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let department_id = DepartmentId::new();
    let borrower = mint_jwt(department_id, vec![Role::BORROWER]);

    let (status, body) = srv.get(&borrower.token, "/api/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["department_id"].as_str().unwrap(), department_id.to_string());
    assert_eq!(body["principal_id"].as_str().unwrap(), borrower.id.to_string());
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "borrows.request"));
}

#[tokio::test]
async fn good_return_restores_stock_once() {
    let srv = TestServer::spawn().await;
    let department_id = DepartmentId::new();
    let admin = mint_jwt(department_id, vec![Role::ADMIN]);
    let borrower = mint_jwt(department_id, vec![Role::BORROWER]);

    let item = register_item(&srv, &admin, "Oscilloscope", 5).await;
    let tx = request_borrow(&srv, &borrower, &item, 2).await;

    // Borrowers cannot approve.
    let (status, body) = srv.post(&borrower.token, &format!("/api/borrows/{tx}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = srv.post(&admin.token, &format!("/api/borrows/{tx}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction"]["status"], "borrowed");
    assert_eq!(body["item"]["available_quantity"], 3);

    srv.get_eventually(&borrower.token, &format!("/api/items/{item}"), |b| {
        b["available_quantity"] == 3 && b["on_loan_quantity"] == 2
    })
    .await;

    let (status, body) = srv
        .post(&borrower.token, &format!("/api/borrows/{tx}/return"), json!({ "notes": "left at front desk" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction"]["status"], "pending_return_verification");

    let (status, body) = srv
        .post(&admin.token, &format!("/api/borrows/{tx}/verification/verify"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction"]["status"], "returned");
    assert_eq!(body["transaction"]["return"]["inspection_status"], "pending_inspection");

    let inspection = json!({ "inspection_status": "good_condition", "condition": "good" });
    let (status, body) = srv.post(&admin.token, &format!("/api/borrows/{tx}/inspection"), inspection).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["available_quantity"], 5);
    assert_eq!(body["transaction"]["stock_restored"], true);

    // Editing the inspection never restores twice.
    let edit = json!({ "inspection_status": "minor_damage", "condition": "fair", "notes": "scratched" });
    let (status, body) = srv.post(&admin.token, &format!("/api/borrows/{tx}/inspection"), edit).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["item"].is_null());

    srv.get_eventually(&borrower.token, &format!("/api/items/{item}"), |b| {
        b["available_quantity"] == 5 && b["status"] == "available"
    })
    .await;

    let borrow = srv
        .get_eventually(&borrower.token, &format!("/api/borrows/{tx}"), |b| {
            b["return"]["inspection_status"] == "minor_damage"
        })
        .await;
    assert_eq!(borrow["status"], "returned");
    assert_eq!(borrow["verifications"].as_array().unwrap().len(), 1);
    assert_eq!(borrow["verifications"][0]["status"], "verified");
}

#[tokio::test]
async fn damaged_return_stays_on_loan_until_written_off() {
    let srv = TestServer::spawn().await;
    let department_id = DepartmentId::new();
    let admin = mint_jwt(department_id, vec![Role::ADMIN]);
    let borrower = mint_jwt(department_id, vec![Role::BORROWER]);

    let item = register_item(&srv, &admin, "Drone", 3).await;
    let tx = request_borrow(&srv, &borrower, &item, 1).await;
    borrow_and_hand_back(&srv, &admin, &borrower, &tx).await;

    let inspection = json!({ "inspection_status": "major_damage", "condition": "damaged" });
    let (status, body) = srv.post(&admin.token, &format!("/api/borrows/{tx}/inspection"), inspection).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["item"].is_null());

    let (status, body) = srv.post(&admin.token, &format!("/api/borrows/{tx}/write-off"), json!({ "reason": "cracked frame" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["total_quantity"], 2);
    assert_eq!(body["item"]["available_quantity"], 2);

    // Written-off units can no longer be restored.
    let fixed = json!({ "inspection_status": "good_condition", "condition": "good" });
    let (status, body) = srv.post(&admin.token, &format!("/api/borrows/{tx}/inspection"), fixed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invariant_violation");

    srv.get_eventually(&admin.token, &format!("/api/items/{item}"), |b| {
        b["total_quantity"] == 2 && b["on_loan_quantity"] == 0
    })
    .await;
}

#[tokio::test]
async fn rejected_verification_returns_to_borrowed() {
    let srv = TestServer::spawn().await;
    let department_id = DepartmentId::new();
    let admin = mint_jwt(department_id, vec![Role::ADMIN]);
    let borrower = mint_jwt(department_id, vec![Role::BORROWER]);

    let item = register_item(&srv, &admin, "Tripod", 1).await;
    let tx = request_borrow(&srv, &borrower, &item, 1).await;
    srv.post(&admin.token, &format!("/api/borrows/{tx}/approve"), json!({})).await;
    srv.post(&borrower.token, &format!("/api/borrows/{tx}/return"), json!({})).await;

    let (status, body) = srv
        .post(&admin.token, &format!("/api/borrows/{tx}/verification/reject"), json!({ "reason": "" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = srv
        .post(&admin.token, &format!("/api/borrows/{tx}/verification/reject"), json!({ "reason": "not on the shelf" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction"]["status"], "borrowed");
    assert_eq!(body["transaction"]["verifications"][0]["status"], "rejected");

    // Units stay on loan.
    let (_, body) = srv.get(&admin.token, &format!("/api/items/{item}")).await;
    assert_eq!(body["available_quantity"], 0);
}

#[tokio::test]
async fn invalid_requests_map_to_documented_statuses() {
    let srv = TestServer::spawn().await;
    let department_id = DepartmentId::new();
    let admin = mint_jwt(department_id, vec![Role::ADMIN]);
    let borrower = mint_jwt(department_id, vec![Role::BORROWER]);

    let item = register_item(&srv, &admin, "Soldering iron", 2).await;

    // More than the department owns.
    let (status, _) = srv
        .post(&borrower.token, "/api/borrows", json!({ "item_id": item, "quantity": 3 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = srv
        .post(&borrower.token, "/api/borrows", json!({ "item_id": item, "quantity": 0 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = srv.get(&admin.token, "/api/borrows/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let unknown = PrincipalId::new().to_string();
    let (status, _) = srv.post(&admin.token, &format!("/api/borrows/{unknown}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = srv
        .post(&borrower.token, "/api/borrows", json!({ "item_id": unknown, "quantity": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let tx = request_borrow(&srv, &borrower, &item, 1).await;
    let (status, _) = srv.post(&admin.token, &format!("/api/borrows/{tx}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = srv.post(&admin.token, &format!("/api/borrows/{tx}/approve"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invariant_violation");

    let (status, _) = srv.get(&admin.token, "/api/borrows?status=lost").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn malformed_bodies_get_structured_validation_errors() {
    let srv = TestServer::spawn().await;
    let department_id = DepartmentId::new();
    let admin = mint_jwt(department_id, vec![Role::ADMIN]);
    let borrower = mint_jwt(department_id, vec![Role::BORROWER]);

    let item = register_item(&srv, &admin, "Oscilloscope", 2).await;

    let (status, body) = srv
        .post(&borrower.token, "/api/borrows", json!({ "item_id": item, "quantity": -1 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].is_string());

    let (status, body) = srv
        .post(&admin.token, &format!("/api/items/{item}/restock"), json!({ "quantity": "lots" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let tx = request_borrow(&srv, &borrower, &item, 1).await;
    borrow_and_hand_back(&srv, &admin, &borrower, &tx).await;

    let (status, body) = srv
        .post(
            &admin.token,
            &format!("/api/borrows/{tx}/inspection"),
            json!({ "inspection_status": "broken", "condition": "good" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = srv.post_empty(&admin.token, &format!("/api/borrows/{tx}/inspection")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = srv
        .post(&admin.token, &format!("/api/borrows/{tx}/write-off"), json!({ "reason": 42 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn optional_bodies_may_be_omitted() {
    let srv = TestServer::spawn().await;
    let department_id = DepartmentId::new();
    let admin = mint_jwt(department_id, vec![Role::ADMIN]);
    let borrower = mint_jwt(department_id, vec![Role::BORROWER]);

    let item = register_item(&srv, &admin, "Field radio", 2).await;
    let tx = request_borrow(&srv, &borrower, &item, 1).await;

    let (status, _) = srv.post_empty(&admin.token, &format!("/api/borrows/{tx}/approve")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = srv.post_empty(&borrower.token, &format!("/api/borrows/{tx}/return")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["transaction"]["status"], "pending_return_verification");

    // A second approval while the return is being verified is state-machine misuse.
    let (status, body) = srv.post_empty(&admin.token, &format!("/api/borrows/{tx}/approve")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invariant_violation");

    let (status, body) = srv
        .post_empty(&admin.token, &format!("/api/borrows/{tx}/verification/verify"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["transaction"]["status"], "returned");

    let lost = json!({ "inspection_status": "lost", "condition": "lost" });
    let (status, _) = srv.post(&admin.token, &format!("/api/borrows/{tx}/inspection"), lost).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv.post_empty(&admin.token, &format!("/api/borrows/{tx}/write-off")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["item"]["total_quantity"], 1);
    assert_eq!(body["item"]["available_quantity"], 1);
}

#[tokio::test]
async fn borrowers_only_see_their_own_transactions() {
    let srv = TestServer::spawn().await;
    let department_id = DepartmentId::new();
    let admin = mint_jwt(department_id, vec![Role::ADMIN]);
    let alice = mint_jwt(department_id, vec![Role::BORROWER]);
    let bob = mint_jwt(department_id, vec![Role::BORROWER]);

    let item = register_item(&srv, &admin, "Microscope", 4).await;
    let alice_tx = request_borrow(&srv, &alice, &item, 1).await;
    let bob_tx = request_borrow(&srv, &bob, &item, 1).await;
    srv.post(&admin.token, &format!("/api/borrows/{bob_tx}/reject"), json!({ "reason": "reserved for class" }))
        .await;

    let all = srv
        .get_eventually(&admin.token, "/api/borrows", |b| b["items"].as_array().unwrap().len() == 2)
        .await;
    assert_eq!(all["items"][0]["id"], bob_tx.as_str());

    let rejected = srv
        .get_eventually(&admin.token, "/api/borrows?status=rejected", |b| {
            b["items"].as_array().unwrap().len() == 1
        })
        .await;
    assert_eq!(rejected["items"][0]["rejection_reason"], "reserved for class");

    let (status, mine) = srv.get(&alice.token, "/api/borrows").await;
    assert_eq!(status, StatusCode::OK);
    let mine = mine["items"].as_array().unwrap().clone();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["id"], alice_tx.as_str());

    let (status, _) = srv.get(&alice.token, &format!("/api/borrows/{bob_tx}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Only the owner (or an admin) may hand items back.
    srv.post(&admin.token, &format!("/api/borrows/{alice_tx}/approve"), json!({})).await;
    let (status, _) = srv.post(&bob.token, &format!("/api/borrows/{alice_tx}/return"), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.post(&admin.token, &format!("/api/borrows/{alice_tx}/return"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn departments_are_isolated() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(DepartmentId::new(), vec![Role::ADMIN]);
    let other_admin = mint_jwt(DepartmentId::new(), vec![Role::ADMIN]);

    let item = register_item(&srv, &admin, "3D printer", 1).await;
    srv.get_eventually(&admin.token, &format!("/api/items/{item}"), |_| true).await;

    let (status, _) = srv.get(&other_admin.token, &format!("/api/items/{item}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv
        .post(&other_admin.token, &format!("/api/items/{item}/restock"), json!({ "quantity": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = srv.get(&other_admin.token, "/api/items").await;
    assert!(listed["items"].as_array().unwrap().is_empty());
}
