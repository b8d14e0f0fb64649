use axum::{
    routing::get,
    Router,
};
use crate::state::AppState;
use crate::handlers::inventory_issue;
use crate::middleware::auth::require_auth;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/inventory-issues",
            get(inventory_issue::list_issues).post(inventory_issue::create_issue),
        )
        .route(
            "/inventory-issues/product-suggestions",
            get(inventory_issue::product_suggestions),
        )
        .route("/inventory-issues/{id}", get(inventory_issue::get_issue))
        .route_layer(axum::middleware::from_fn(require_auth))
}
