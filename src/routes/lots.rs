use axum::{
    routing::get,
    Router,
};
use crate::state::AppState;
use crate::handlers::lot::{list_lots, get_lot};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/lots", get(list_lots))
        .route("/lots/{id}", get(get_lot))
}
