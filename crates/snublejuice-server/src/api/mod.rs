mod filters;
mod metadata;
mod products;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use snublejuice_core::{AppConfig, CatalogConfig};
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
    REQUEST_ID_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub catalog: Arc<CatalogConfig>,
    /// Listing page size.
    pub per_page: u64,
    /// Record storefront visits in the `visitors` metadata document.
    pub count_visitors: bool,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, catalog: CatalogConfig, config: &AppConfig) -> Self {
        Self {
            pool,
            catalog: Arc::new(catalog),
            per_page: config.per_page,
            count_visitors: config.is_production(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "prices_stale" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &snublejuice_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

fn storefront_router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/products", get(products::list_products))
        .route("/api/v1/stores", get(filters::list_stores))
        .route("/api/v1/countries", get(filters::list_countries))
        .route("/api/v1/categories", get(filters::list_categories))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ))
}

fn admin_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/metadata/stock/{channel}",
            put(metadata::update_stock),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(storefront_router(rate_limit.clone()))
        .merge(admin_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(CompressionLayer::new())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match snublejuice_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[must_use]
pub fn rate_limit_state(config: &AppConfig) -> RateLimitState {
    RateLimitState::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use snublejuice_core::{Channel, Product};
    use tower::ServiceExt;

    fn test_state(pool: PgPool) -> AppState {
        AppState {
            pool,
            catalog: Arc::new(CatalogConfig::default()),
            per_page: 15,
            count_visitors: false,
        }
    }

    fn default_rate_limit_state() -> RateLimitState {
        RateLimitState::new(500, Duration::from_secs(600))
    }

    fn test_app(pool: PgPool) -> Router {
        let auth = AuthState::from_keys("", true).expect("auth");
        build_app(test_state(pool), auth, default_rate_limit_state())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn wine(index: i64, name: &str, price: f64) -> Product {
        Product {
            index,
            name: name.to_string(),
            category: Some("Rødvin".to_string()),
            country: Some("Italia".to_string()),
            price: Some(price),
            discount: Some(-5.0),
            alcohol: Some(13.5),
            volume: Some(75.0),
            buyable: true,
            orderable: true,
            updated: true,
            stores: vec!["Oslo, Vika".to_string()],
            ..Product::default()
        }
    }

    async fn seed(pool: &PgPool, products: &[Product]) {
        for product in products {
            snublejuice_db::upsert_product(pool, product)
                .await
                .expect("upsert_product");
        }
    }

    #[test]
    fn api_error_validation_error_maps_to_bad_request() {
        let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn api_error_prices_stale_maps_to_unavailable() {
        let response = ApiError::new("req-1", "prices_stale", "stale").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn products_unavailable_while_prices_stale(pool: PgPool) {
        let response = test_app(pool)
            .oneshot(get("/api/v1/products"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"].as_str(), Some("prices_stale"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn products_lists_filtered_page(pool: PgPool) {
        seed(
            &pool,
            &[
                wine(1, "Chianti Classico", 189.9),
                wine(2, "Brunello di Montalcino", 549.0),
            ],
        )
        .await;
        snublejuice_db::set_prices_fresh(&pool, Channel::Vinmonopolet, true)
            .await
            .expect("set_prices_fresh");

        let response = test_app(pool)
            .oneshot(get(
                "/api/v1/products?category=r%C3%B8dvin&price=200&country=Alle+land&store-vinmonopolet=Spesifikk+butikk",
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let products = json["data"]["products"].as_array().expect("products");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0]["index"].as_i64(), Some(1));
        assert_eq!(json["data"]["total"].as_u64(), Some(1));
        assert_eq!(json["data"]["page"].as_u64(), Some(1));
        assert_eq!(json["data"]["channel"].as_str(), Some("vinmonopolet"));
        assert!(json["meta"]["request_id"].is_string());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn products_channel_follows_host_prefix(pool: PgPool) {
        snublejuice_db::set_prices_fresh(&pool, Channel::Vinmonopolet, true)
            .await
            .expect("set_prices_fresh");

        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/products")
                    .header(header::HOST, "taxfree.snublejuice.no")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(
            response.status(),
            StatusCode::SERVICE_UNAVAILABLE,
            "taxfree prices are still stale"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn products_rejects_unknown_channel(pool: PgPool) {
        let response = test_app(pool)
            .oneshot(get("/api/v1/products?channel=systembolaget"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn stores_and_countries_list_distinct_values(pool: PgPool) {
        seed(&pool, &[wine(1, "Barbera d'Asti", 159.0)]).await;
        let app = test_app(pool);

        let response = app
            .clone()
            .oneshot(get("/api/v1/stores"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["vinmonopolet"][0].as_str(), Some("Oslo, Vika"));
        assert!(json["data"]["taxfree"].as_array().expect("taxfree").is_empty());

        let response = app
            .oneshot(get("/api/v1/countries"))
            .await
            .expect("response");
        let json = body_json(response).await;
        assert_eq!(json["data"][0].as_str(), Some("Italia"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn categories_come_from_catalog(pool: PgPool) {
        let response = test_app(pool)
            .oneshot(get("/api/v1/categories"))
            .await
            .expect("response");
        let json = body_json(response).await;
        let categories = json["data"].as_array().expect("categories");
        assert_eq!(categories.len(), CatalogConfig::default().categories.len());
        assert!(categories.iter().any(|c| c["slug"] == "rødvin" && c["name"] == "Rødvin"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn stock_update_requires_bearer_token(pool: PgPool) {
        let auth = AuthState::from_keys("scrape-key", false).expect("auth");
        let app = build_app(test_state(pool.clone()), auth, default_rate_limit_state());

        let unauthorized = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/v1/metadata/stock/taxfree")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"fresh":true}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/v1/metadata/stock/taxfree")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, "Bearer scrape-key")
                    .body(Body::from(r#"{"fresh":true}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let metadata = snublejuice_db::get_metadata(&pool)
            .await
            .expect("get_metadata");
        assert!(metadata.prices_fresh(Channel::Taxfree));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn rate_limit_rejects_excess_requests(pool: PgPool) {
        let auth = AuthState::from_keys("", true).expect("auth");
        let app = build_app(
            test_state(pool),
            auth,
            RateLimitState::new(1, Duration::from_secs(600)),
        );

        let first = app
            .clone()
            .oneshot(get("/api/v1/categories"))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .clone()
            .oneshot(get("/api/v1/categories"))
            .await
            .expect("response");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(second).await;
        assert_eq!(json["error"]["code"].as_str(), Some("rate_limited"));

        let other_client = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/categories")
                    .header("x-forwarded-for", "198.51.100.20")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(other_client.status(), StatusCode::OK);
    }
}
