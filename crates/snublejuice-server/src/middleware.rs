use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

const API_KEYS_VAR: &str = "SNUBLEJUICE_API_KEYS";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Prune expired client windows once the table grows past this.
const PRUNE_THRESHOLD: usize = 4096;

/// Request ID stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Bearer tokens accepted on the admin routes. `None` disables the check.
#[derive(Debug, Clone)]
pub struct AuthState {
    tokens: Option<Arc<HashSet<String>>>,
}

impl AuthState {
    /// Read tokens from `SNUBLEJUICE_API_KEYS`.
    ///
    /// # Errors
    ///
    /// Fails when no keys are configured outside development.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var(API_KEYS_VAR).unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// Parse a comma-separated token list.
    ///
    /// # Errors
    ///
    /// Fails when `raw` holds no tokens and `is_development` is false.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let tokens: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        match (tokens.is_empty(), is_development) {
            (false, _) => Ok(Self {
                tokens: Some(Arc::new(tokens)),
            }),
            (true, true) => {
                tracing::warn!("{API_KEYS_VAR} not set; admin routes are open in development");
                Ok(Self { tokens: None })
            }
            (true, false) => anyhow::bail!("{API_KEYS_VAR} must list at least one bearer token"),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.tokens.is_some()
    }

    fn allows(&self, token: &str) -> bool {
        self.tokens.as_ref().is_none_or(|t| t.contains(token))
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter keyed by client address.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    clients: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request from `client`. Returns `false` once the client's
    /// current window is used up.
    async fn admit(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;

        if clients.len() >= PRUNE_THRESHOLD {
            clients.retain(|_, w| now.duration_since(w.started_at) < self.window);
        }

        let window = clients.entry(client.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now.duration_since(window.started_at) >= self.window {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }
}

/// Last `X-Forwarded-For` hop, else the peer address. The server sits behind
/// one reverse proxy, which appends the address it saw; earlier entries come
/// from the client and are ignored.
fn client_key(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(client) = forwarded {
        return client.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

/// Take `x-request-id` from the request or mint a `UUIDv4`, expose it as a
/// [`RequestId`] extension and echo it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), val);
    }
    res
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    let authorized = extract_bearer_token(req.headers().get(AUTHORIZATION))
        .is_some_and(|token| auth.allows(token));
    if !auth.is_enabled() || authorized {
        return next.run(req).await;
    }

    tracing::warn!(path = %req.uri().path(), "rejected admin request without valid token");
    ApiError::new(
        request_id_of(&req),
        "unauthorized",
        "missing or invalid bearer token",
    )
    .into_response()
}

pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_key(&req);
    if rate_limit.admit(&client).await {
        return next.run(req).await;
    }

    tracing::warn!(client = %client, "rate limit exceeded");
    ApiError::new(
        request_id_of(&req),
        "rate_limited",
        "For mange forespørsler, prøv igjen senere.",
    )
    .into_response()
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn bearer_token_is_extracted() {
        let header = HeaderValue::from_static("Bearer scrape-token");
        assert_eq!(extract_bearer_token(Some(&header)), Some("scrape-token"));

        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn empty_key_list_disables_auth_only_in_development() {
        let state = AuthState::from_keys(" , ", true).expect("dev allows missing keys");
        assert!(!state.is_enabled());
        assert!(AuthState::from_keys("", false).is_err());
    }

    #[test]
    fn configured_keys_are_matched_exactly() {
        let state = AuthState::from_keys("a, b", false).expect("keys present");
        assert!(state.is_enabled());
        assert!(state.allows("b"));
        assert!(!state.allows("c"));
        assert!(!state.allows(""));
    }

    fn forwarded(chain: &str) -> Request {
        axum::http::Request::builder()
            .header("x-forwarded-for", chain)
            .body(Body::empty())
            .expect("request")
    }

    #[test]
    fn client_key_uses_hop_added_by_proxy() {
        assert_eq!(client_key(&forwarded("203.0.113.7, 10.0.0.1")), "10.0.0.1");
        assert_eq!(client_key(&forwarded("198.51.100.1")), "198.51.100.1");

        let mut req = Request::new(Body::empty());
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 5123))));
        assert_eq!(client_key(&req), "192.0.2.4");

        assert_eq!(client_key(&Request::new(Body::empty())), "unknown");
    }

    #[tokio::test]
    async fn spoofed_forwarded_prefix_shares_one_budget() {
        let limiter = RateLimitState::new(1, Duration::from_secs(600));
        let mut admitted = 0;
        for i in 0..5 {
            let req = forwarded(&format!("10.9.9.{i}, 198.51.100.1"));
            if limiter.admit(&client_key(&req)).await {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(limiter.clients.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn clients_have_separate_budgets() {
        let limiter = RateLimitState::new(2, Duration::from_secs(600));
        assert!(limiter.admit("a").await);
        assert!(limiter.admit("a").await);
        assert!(!limiter.admit("a").await);
        assert!(limiter.admit("b").await);
    }

    #[tokio::test]
    async fn expired_window_starts_over() {
        let limiter = RateLimitState::new(1, Duration::ZERO);
        assert!(limiter.admit("a").await);
        assert!(limiter.admit("a").await);
    }
}
