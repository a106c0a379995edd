use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use snublejuice_core::{Channel, StockMetadata};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct UpdateStockRequest {
    pub fresh: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct StockUpdate {
    channel: Channel,
    stock: StockMetadata,
    /// Products whose `updated` flag was cleared; only set when a scrape
    /// cycle starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    stale_products: Option<u64>,
}

/// PUT /api/v1/metadata/stock/{channel}: scraper jobs flag price freshness.
///
/// `fresh: false` opens a scrape cycle: the channel stops being served and
/// every product's `updated` flag for it is cleared. `fresh: true` closes the
/// cycle and stamps the refresh time.
pub(super) async fn update_stock(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(channel): Path<String>,
    Json(body): Json<UpdateStockRequest>,
) -> Result<Json<ApiResponse<StockUpdate>>, ApiError> {
    let rid = &req_id.0;
    let channel: Channel = channel
        .parse()
        .map_err(|e: snublejuice_core::CoreError| ApiError::new(rid, "not_found", e.to_string()))?;

    let stock = snublejuice_db::set_prices_fresh(&state.pool, channel, body.fresh)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let stale_products = if body.fresh {
        None
    } else {
        let cleared = snublejuice_db::mark_channel_stale(&state.pool, channel)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?;
        Some(cleared)
    };

    Ok(Json(ApiResponse {
        data: StockUpdate {
            channel,
            stock,
            stale_products,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
