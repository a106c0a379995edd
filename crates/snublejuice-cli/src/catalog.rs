//! Catalog write commands: seeding, price recording and stock freshness.

use std::path::Path;

use anyhow::Context;
use snublejuice_core::{Channel, Product};
use sqlx::PgPool;

/// Parse a seed file holding a JSON array of products.
///
/// # Errors
///
/// Fails if the file cannot be read, is not a product array, or repeats a
/// product index.
pub(crate) fn read_seed_file(path: &Path) -> anyhow::Result<Vec<Product>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    parse_seed(&content).with_context(|| format!("invalid seed file {}", path.display()))
}

fn parse_seed(content: &str) -> anyhow::Result<Vec<Product>> {
    let products: Vec<Product> = serde_json::from_str(content)?;

    let mut seen = std::collections::HashSet::new();
    for product in &products {
        if !seen.insert(product.index) {
            anyhow::bail!("duplicate product index {}", product.index);
        }
        if product.name.trim().is_empty() {
            anyhow::bail!("product {} has an empty name", product.index);
        }
    }

    Ok(products)
}

pub(crate) async fn run_seed(pool: &PgPool, path: &Path) -> anyhow::Result<()> {
    let products = read_seed_file(path)?;

    for product in &products {
        snublejuice_db::upsert_product(pool, product)
            .await
            .with_context(|| format!("failed to upsert product {}", product.index))?;
    }

    tracing::info!(count = products.len(), path = %path.display(), "seeded products");
    println!("{} products upserted", products.len());
    Ok(())
}

pub(crate) async fn run_price(
    pool: &PgPool,
    index: i64,
    price: f64,
    taxfree_index: Option<i64>,
) -> anyhow::Result<()> {
    if !price.is_finite() || price <= 0.0 {
        anyhow::bail!("price must be a positive number, got {price}");
    }

    let product = match taxfree_index {
        Some(taxfree_index) => {
            snublejuice_db::record_taxfree_price(pool, index, taxfree_index, price).await?
        }
        None => snublejuice_db::record_price(pool, index, price).await?,
    };

    let discount = match (&product.taxfree, taxfree_index) {
        (Some(overlay), Some(_)) => overlay.discount,
        _ => product.discount,
    };
    println!(
        "{} {}: {price:.2} kr ({:+.1} %)",
        product.index,
        product.name,
        discount.unwrap_or(0.0)
    );
    Ok(())
}

pub(crate) async fn run_stock(pool: &PgPool, channel: Channel, fresh: bool) -> anyhow::Result<()> {
    snublejuice_db::set_prices_fresh(pool, channel, fresh).await?;

    if fresh {
        println!("{channel}: prices marked fresh");
    } else {
        let cleared = snublejuice_db::mark_channel_stale(pool, channel).await?;
        println!("{channel}: prices marked stale, {cleared} products awaiting refresh");
    }
    Ok(())
}
