//! Database operations for the `metadata` documents (`stock`, `visitors`).

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use snublejuice_core::{Channel, Metadata, StockMetadata, VisitorCounts};
use sqlx::PgPool;

use crate::DbError;

const STOCK: &str = "stock";
const VISITORS: &str = "visitors";

fn decode<T: DeserializeOwned>(id: &str, data: serde_json::Value) -> Result<T, DbError> {
    serde_json::from_value(data).map_err(|e| DbError::InvalidDocument {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn encode<T: Serialize>(id: &str, doc: &T) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(doc).map_err(|e| DbError::InvalidDocument {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

/// Read every metadata document. Missing documents read as defaults.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidDocument`] if a stored document cannot be decoded.
pub async fn get_metadata(pool: &PgPool) -> Result<Metadata, DbError> {
    let rows = sqlx::query_as::<_, (String, serde_json::Value)>(
        "SELECT id, data FROM metadata WHERE id = ANY($1)",
    )
    .bind(vec![STOCK.to_string(), VISITORS.to_string()])
    .fetch_all(pool)
    .await?;

    let mut metadata = Metadata::default();
    for (id, data) in rows {
        match id.as_str() {
            STOCK => metadata.stock = decode(&id, data)?,
            VISITORS => metadata.visitors = decode(&id, data)?,
            _ => {}
        }
    }
    Ok(metadata)
}

/// Load a document for update inside `tx`, apply `change`, and write it back.
async fn update_document<T, F>(pool: &PgPool, id: &str, change: F) -> Result<T, DbError>
where
    T: Serialize + DeserializeOwned + Default,
    F: FnOnce(&mut T),
{
    let mut tx = pool.begin().await?;

    let current: Option<serde_json::Value> =
        sqlx::query_scalar("SELECT data FROM metadata WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

    let mut doc: T = match current {
        Some(data) => decode(id, data)?,
        None => T::default(),
    };
    change(&mut doc);

    sqlx::query(
        "INSERT INTO metadata (id, data) VALUES ($1, $2::jsonb) \
         ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
    )
    .bind(id)
    .bind(encode(id, &doc)?)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(doc)
}

/// Flag whether the channel's latest price scrape completed. Marking a
/// channel fresh also stamps its stock refresh time.
///
/// # Errors
///
/// Returns [`DbError`] if the document cannot be read, decoded or written.
pub async fn set_prices_fresh(
    pool: &PgPool,
    channel: Channel,
    fresh: bool,
) -> Result<StockMetadata, DbError> {
    let stock = update_document(pool, STOCK, |stock: &mut StockMetadata| {
        stock.prices.set(channel, fresh);
        if fresh {
            stock.set_updated_at(channel, Some(Utc::now()));
        }
    })
    .await?;

    tracing::info!(channel = %channel, fresh, "updated stock freshness");
    Ok(stock)
}

/// Upsert of the `visitors` document. An existing row has its bucket total
/// and month/channel counter incremented in place, creating missing objects
/// along the path; a missing row is inserted as `$5`.
const INCREMENT_VISITOR: &str = "INSERT INTO metadata (id, data) VALUES ($1, $5::jsonb) \
     ON CONFLICT (id) DO UPDATE SET updated_at = NOW(), data = \
     jsonb_set(jsonb_set(jsonb_set(jsonb_set(jsonb_set(metadata.data, \
       ARRAY[$2::text], coalesce(metadata.data -> $2::text, '{}'::jsonb)), \
       ARRAY[$2::text, 'total'], \
         to_jsonb(coalesce((metadata.data #>> ARRAY[$2::text, 'total'])::bigint, 0) + 1)), \
       ARRAY[$2::text, 'month'], \
         coalesce(metadata.data #> ARRAY[$2::text, 'month'], '{}'::jsonb)), \
       ARRAY[$2::text, 'month', $3::text], \
         coalesce(metadata.data #> ARRAY[$2::text, 'month', $3::text], '{}'::jsonb)), \
       ARRAY[$2::text, 'month', $3::text, $4::text], \
         to_jsonb(coalesce((metadata.data #>> ARRAY[$2::text, 'month', $3::text, $4::text])::bigint, 0) + 1)) \
     RETURNING data";

/// Count one storefront visit for `month` (`YYYY-MM`) with a single atomic
/// statement on the `visitors` document.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails or the stored document cannot
/// be decoded.
pub async fn increment_visitor(
    pool: &PgPool,
    month: &str,
    channel: Channel,
    fresh: bool,
) -> Result<VisitorCounts, DbError> {
    let bucket = if fresh { "fresh" } else { "newpage" };
    let mut first = VisitorCounts::default();
    first.record(month, channel, fresh);

    let data: serde_json::Value = sqlx::query_scalar(INCREMENT_VISITOR)
        .bind(VISITORS)
        .bind(bucket)
        .bind(month)
        .bind(channel.as_str())
        .bind(encode(VISITORS, &first)?)
        .fetch_one(pool)
        .await?;

    decode(VISITORS, data)
}
