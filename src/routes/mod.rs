pub mod products;
pub mod users;
pub mod lots;
pub mod inventory_issues;

use axum::Router;
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(products::routes())
        .merge(users::routes())
        .merge(lots::routes())
        .merge(inventory_issues::routes())
}
