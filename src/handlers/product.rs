// src/handlers/product.rs
//
// Product catalog reads. The catalog's lifecycle (create/update/delete) is
// owned by a separate admin service; the issue flow only needs lookups.
use axum::{
    extract::{Path, State},
    Json,
};
use crate::models::product::Product;
use crate::state::AppState;
use crate::error::AppError;
use tracing::{error, instrument};

// GET /products - List all products
#[instrument(skip(state))]
pub async fn get_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, AppError> {
    match sqlx::query_as::<_, Product>(
        "SELECT id, sku, name, unit, created_at FROM products ORDER BY name",
    )
    .fetch_all(&state.db_pool)
    .await
    {
        Ok(products) => Ok(Json(products)),
        Err(e) => {
            error!(?e, "Failed to fetch products");
            Err(e.into())
        }
    }
}

// GET /products/:id - Get single product
#[instrument(skip(state), fields(id))]
pub async fn get_product(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Product>, AppError> {
    let product = sqlx::query_as::<_, Product>(
        "SELECT id, sku, name, unit, created_at FROM products WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::not_found(format!("product not found: {id}")))?;

    Ok(Json(product))
}
