//! Database operations for the `products` catalog.

use chrono::{DateTime, Utc};
use serde::Serialize;
use snublejuice_core::{
    Channel, Pipeline, Product, ProductSource, Rating, SourceError, TaxfreeOverlay,
};
use sqlx::{PgExecutor, PgPool};

use crate::sql::{self, PRODUCT_COLUMNS};
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table. The duty-free overlay is flattened into
/// `tf_*` columns and is present when `tf_index` is set.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub product_index: i64,
    pub name: String,
    pub url: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub country: Option<String>,
    pub year: Option<i32>,
    pub price: Option<f64>,
    pub oldprice: Option<f64>,
    pub prices: Vec<f64>,
    pub discount: Option<f64>,
    pub volume: Option<f64>,
    pub literprice: Option<f64>,
    pub alcohol: Option<f64>,
    pub alcoholprice: Option<f64>,
    pub buyable: bool,
    pub orderable: bool,
    pub instores: bool,
    pub updated: bool,
    pub stores: Vec<String>,
    pub rating_value: Option<f64>,
    pub rating_count: Option<i64>,
    pub rating_updated: Option<DateTime<Utc>>,
    pub tf_index: Option<i64>,
    pub tf_name: Option<String>,
    pub tf_url: Option<String>,
    pub tf_price: Option<f64>,
    pub tf_oldprice: Option<f64>,
    pub tf_prices: Option<Vec<f64>>,
    pub tf_discount: Option<f64>,
    pub tf_literprice: Option<f64>,
    pub tf_alcoholprice: Option<f64>,
    pub tf_updated: Option<bool>,
    pub tf_stores: Option<Vec<String>>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let rating = row.rating_updated.map(|updated| Rating {
            value: row.rating_value,
            count: row.rating_count,
            updated,
        });

        let taxfree = row.tf_index.map(|index| TaxfreeOverlay {
            index,
            name: row.tf_name,
            url: row.tf_url,
            price: row.tf_price,
            oldprice: row.tf_oldprice,
            prices: row.tf_prices.unwrap_or_default(),
            discount: row.tf_discount,
            literprice: row.tf_literprice,
            alcoholprice: row.tf_alcoholprice,
            updated: row.tf_updated.unwrap_or(false),
            stores: row.tf_stores.unwrap_or_default(),
        });

        Product {
            index: row.product_index,
            name: row.name,
            url: row.url,
            category: row.category,
            subcategory: row.subcategory,
            country: row.country,
            year: row.year,
            price: row.price,
            oldprice: row.oldprice,
            prices: row.prices,
            discount: row.discount,
            volume: row.volume,
            literprice: row.literprice,
            alcohol: row.alcohol,
            alcoholprice: row.alcoholprice,
            buyable: row.buyable,
            orderable: row.orderable,
            instores: row.instores,
            updated: row.updated,
            stores: row.stores,
            rating,
            taxfree,
        }
    }
}

/// Distinct store names per channel, for the store dropdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreLists {
    pub vinmonopolet: Vec<String>,
    pub taxfree: Vec<String>,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// [`ProductSource`] backed by the `products` table.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> SourceError {
    SourceError::Backend(Box::new(e))
}

impl ProductSource for PgCatalog {
    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Product>, SourceError> {
        let mut qb = sql::select_products(pipeline);
        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn count(&self, pipeline: &Pipeline) -> Result<u64, SourceError> {
        let mut qb = sql::count_products(pipeline);
        let count: i64 = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// products operations
// ---------------------------------------------------------------------------

/// Fetch a single product by its monopoly index.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, index: i64) -> Result<Option<Product>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_index = $1"
    ))
    .bind(index)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Product::from))
}

/// Upserts a product as given, replacing every stored field.
///
/// Callers that only observed a new price should use [`record_price`] so the
/// history and derived fields stay consistent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_product(pool: &PgPool, product: &Product) -> Result<(), DbError> {
    write_product(pool, product).await
}

async fn write_product<'e, E>(executor: E, product: &Product) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let rating = product.rating.as_ref();
    let overlay = product.taxfree.as_ref();

    sqlx::query(
        "INSERT INTO products \
             (product_index, name, url, category, subcategory, country, year, \
              price, oldprice, prices, discount, volume, literprice, alcohol, alcoholprice, \
              buyable, orderable, instores, updated, stores, \
              rating_value, rating_count, rating_updated, \
              tf_index, tf_name, tf_url, tf_price, tf_oldprice, tf_prices, tf_discount, \
              tf_literprice, tf_alcoholprice, tf_updated, tf_stores) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, \
                 $8, $9, $10, $11, $12, $13, $14, $15, \
                 $16, $17, $18, $19, $20, \
                 $21, $22, $23, \
                 $24, $25, $26, $27, $28, $29, $30, \
                 $31, $32, $33, $34) \
         ON CONFLICT (product_index) DO UPDATE SET \
             name            = EXCLUDED.name, \
             url             = EXCLUDED.url, \
             category        = EXCLUDED.category, \
             subcategory     = EXCLUDED.subcategory, \
             country         = EXCLUDED.country, \
             year            = EXCLUDED.year, \
             price           = EXCLUDED.price, \
             oldprice        = EXCLUDED.oldprice, \
             prices          = EXCLUDED.prices, \
             discount        = EXCLUDED.discount, \
             volume          = EXCLUDED.volume, \
             literprice      = EXCLUDED.literprice, \
             alcohol         = EXCLUDED.alcohol, \
             alcoholprice    = EXCLUDED.alcoholprice, \
             buyable         = EXCLUDED.buyable, \
             orderable       = EXCLUDED.orderable, \
             instores        = EXCLUDED.instores, \
             updated         = EXCLUDED.updated, \
             stores          = EXCLUDED.stores, \
             rating_value    = EXCLUDED.rating_value, \
             rating_count    = EXCLUDED.rating_count, \
             rating_updated  = EXCLUDED.rating_updated, \
             tf_index        = EXCLUDED.tf_index, \
             tf_name         = EXCLUDED.tf_name, \
             tf_url          = EXCLUDED.tf_url, \
             tf_price        = EXCLUDED.tf_price, \
             tf_oldprice     = EXCLUDED.tf_oldprice, \
             tf_prices       = EXCLUDED.tf_prices, \
             tf_discount     = EXCLUDED.tf_discount, \
             tf_literprice   = EXCLUDED.tf_literprice, \
             tf_alcoholprice = EXCLUDED.tf_alcoholprice, \
             tf_updated      = EXCLUDED.tf_updated, \
             tf_stores       = EXCLUDED.tf_stores, \
             updated_at      = NOW()",
    )
    .bind(product.index)
    .bind(&product.name)
    .bind(&product.url)
    .bind(&product.category)
    .bind(&product.subcategory)
    .bind(&product.country)
    .bind(product.year)
    .bind(product.price)
    .bind(product.oldprice)
    .bind(&product.prices)
    .bind(product.discount)
    .bind(product.volume)
    .bind(product.literprice)
    .bind(product.alcohol)
    .bind(product.alcoholprice)
    .bind(product.buyable)
    .bind(product.orderable)
    .bind(product.instores)
    .bind(product.updated)
    .bind(&product.stores)
    .bind(rating.and_then(|r| r.value))
    .bind(rating.and_then(|r| r.count))
    .bind(rating.map(|r| r.updated))
    .bind(overlay.map(|t| t.index))
    .bind(overlay.and_then(|t| t.name.clone()))
    .bind(overlay.and_then(|t| t.url.clone()))
    .bind(overlay.and_then(|t| t.price))
    .bind(overlay.and_then(|t| t.oldprice))
    .bind(overlay.map(|t| t.prices.clone()))
    .bind(overlay.and_then(|t| t.discount))
    .bind(overlay.and_then(|t| t.literprice))
    .bind(overlay.and_then(|t| t.alcoholprice))
    .bind(overlay.map(|t| t.updated))
    .bind(overlay.map(|t| t.stores.clone()))
    .execute(executor)
    .await?;

    Ok(())
}

async fn lock_product(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    index: i64,
) -> Result<Product, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_index = $1 FOR UPDATE"
    ))
    .bind(index)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Product::from).ok_or(DbError::NotFound)
}

/// Record a scraped monopoly price: appends to the history, recomputes the
/// derived fields and marks the product as refreshed this cycle.
///
/// Returns the stored product.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no product has `index`, or
/// [`DbError::Sqlx`] if a statement fails.
pub async fn record_price(pool: &PgPool, index: i64, price: f64) -> Result<Product, DbError> {
    let mut tx = pool.begin().await?;
    let mut product = lock_product(&mut tx, index).await?;

    product.record_price(price);
    product.updated = true;

    write_product(&mut *tx, &product).await?;
    tx.commit().await?;

    tracing::debug!(index, price, discount = ?product.discount, "recorded price");
    Ok(product)
}

/// Record a scraped duty-free price into the product's overlay, creating the
/// overlay on first sight.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no product has `index`, or
/// [`DbError::Sqlx`] if a statement fails.
pub async fn record_taxfree_price(
    pool: &PgPool,
    index: i64,
    taxfree_index: i64,
    price: f64,
) -> Result<Product, DbError> {
    let mut tx = pool.begin().await?;
    let mut product = lock_product(&mut tx, index).await?;

    product.record_taxfree_price(taxfree_index, price);

    write_product(&mut *tx, &product).await?;
    tx.commit().await?;

    tracing::debug!(index, taxfree_index, price, "recorded taxfree price");
    Ok(product)
}

/// Clear the channel's `updated` flag on every product. Run at the start of a
/// scrape cycle so only products seen again are listed.
///
/// Returns the number of rows touched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_channel_stale(pool: &PgPool, channel: Channel) -> Result<u64, DbError> {
    let statement = match channel {
        Channel::Vinmonopolet => "UPDATE products SET updated = FALSE WHERE updated",
        Channel::Taxfree => "UPDATE products SET tf_updated = FALSE WHERE tf_updated",
    };
    let result = sqlx::query(statement).execute(pool).await?;
    Ok(result.rows_affected())
}

/// Every store name appearing on any product, per channel, sorted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn list_distinct_stores(pool: &PgPool) -> Result<StoreLists, DbError> {
    let vinmonopolet = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT store FROM products, unnest(stores) AS store ORDER BY store",
    )
    .fetch_all(pool)
    .await?;

    let taxfree = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT store FROM products, unnest(tf_stores) AS store ORDER BY store",
    )
    .fetch_all(pool)
    .await?;

    Ok(StoreLists {
        vinmonopolet,
        taxfree,
    })
}

/// Every country appearing on any product, sorted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_distinct_countries(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let countries = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT country FROM products WHERE country IS NOT NULL ORDER BY country",
    )
    .fetch_all(pool)
    .await?;
    Ok(countries)
}
