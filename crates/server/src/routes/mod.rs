pub mod echo;
pub mod entries;
pub mod health;

use axum::{Router, routing::get};

use crate::AppState;

/// Build the operator routes for browsing the audit trail
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/entries", get(entries::list))
        .route("/admin/entries/{id}", get(entries::detail))
}
