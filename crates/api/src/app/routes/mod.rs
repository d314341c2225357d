use axum::{Router, routing::get};

pub mod borrows;
pub mod common;
pub mod items;
pub mod system;

/// Router for all authenticated (department-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/items", items::router())
        .nest("/borrows", borrows::router())
}
