//! Postgres persistence for the product catalog and its metadata documents.

pub mod metadata;
mod pool;
pub mod products;
mod sql;

use thiserror::Error;

pub use metadata::{get_metadata, increment_visitor, set_prices_fresh};
pub use pool::{connect_pool, health_check, run_migrations, PoolConfig};
pub use products::{
    get_product, list_distinct_countries, list_distinct_stores, mark_channel_stale,
    record_price, record_taxfree_price, upsert_product, PgCatalog, ProductRow, StoreLists,
};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("product not found")]
    NotFound,
    #[error("stored document {id} is malformed: {reason}")]
    InvalidDocument { id: String, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}
