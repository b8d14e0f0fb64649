// src/models/product.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub created_at: DateTime<Utc>,
}

pub async fn by_id(exec: impl PgExecutor<'_>, id: i64) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        r#"SELECT id, sku, name, unit, created_at FROM products WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}
