use axum::{
    extract::{Query, RawQuery, State},
    http::{header::HOST, HeaderMap},
    Extension, Json,
};
use chrono::Utc;
use serde::Serialize;
use snublejuice_core::{load, Channel, Product, QueryParams, SortKey};
use snublejuice_db::PgCatalog;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

const DELTA_SORT_NOTICE: &str =
    "Sortering etter prisendring er ikke mulig når sammenlikning ikke er forrige måneds pris.";

#[derive(Debug, Serialize)]
pub(super) struct ProductListing {
    products: Vec<Product>,
    /// Page count, present when the request asked for it.
    total: Option<u64>,
    updated: Option<String>,
    page: u64,
    channel: Channel,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<&'static str>,
}

/// Explicit `channel` parameter first, then the `Host` subdomain.
fn resolve_channel(
    explicit: Option<&str>,
    headers: &HeaderMap,
    request_id: &str,
) -> Result<Channel, ApiError> {
    if let Some(raw) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return raw
            .parse::<Channel>()
            .map_err(|e| ApiError::new(request_id, "bad_request", e.to_string()));
    }

    Ok(headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(Channel::from_host)
        .unwrap_or(Channel::Vinmonopolet))
}

/// GET /api/v1/products: one page of the storefront listing.
pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<QueryParams>,
) -> Result<Json<ApiResponse<ProductListing>>, ApiError> {
    let rid = &req_id.0;
    let channel = resolve_channel(params.channel.as_deref(), &headers, rid)?;

    let metadata = snublejuice_db::get_metadata(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    if !metadata.prices_fresh(channel) {
        return Err(ApiError::new(
            rid,
            "prices_stale",
            "Prisene er ikke oppdatert.",
        ));
    }

    let now = Utc::now();

    if state.count_visitors {
        // A landing without any parameters counts as a fresh visit.
        let fresh = raw_query.as_deref().is_none_or(str::is_empty);
        let month = now.format("%Y-%m").to_string();
        if let Err(e) =
            snublejuice_db::increment_visitor(&state.pool, &month, channel, fresh).await
        {
            tracing::warn!(error = %e, channel = %channel, "failed to record visit");
        }
    }

    let query = params.into_query(channel, &state.catalog, state.per_page);
    let catalog = PgCatalog::new(state.pool.clone());
    let page = load(&catalog, &query, &metadata, now.date_naive()).await;

    let notice = (query.delta > 1 && query.sort == SortKey::Discount).then_some(DELTA_SORT_NOTICE);

    Ok(Json(ApiResponse {
        data: ProductListing {
            products: page.data,
            total: page.total,
            updated: page.updated,
            page: query.page(),
            channel,
            notice,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
