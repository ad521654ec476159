//! Bearer-key authentication and per-client rate limiting for the catalog API.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

pub const API_KEY_VAR: &str = "COMPONENT_CATALOG_API_KEY";
pub const CORS_ORIGINS_VAR: &str = "COMPONENT_CATALOG_CORS_ORIGINS";
pub const RATE_LIMIT_VAR: &str = "COMPONENT_CATALOG_RATE_LIMIT";

const DEFAULT_RATE_LIMIT: u32 = 100;
const RATE_WINDOW: Duration = Duration::from_secs(60);

type Rejection = (StatusCode, String);

/// Who may call the catalog API, from where, and how often.
#[derive(Clone, Debug, Default)]
pub struct SecurityConfig {
    /// Bearer key required on every route except health.
    pub api_key: Option<String>,
    /// Allowed CORS origins. `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
    pub rate_limiter: Option<RateLimiter>,
}

impl SecurityConfig {
    /// Read `COMPONENT_CATALOG_*` variables. Rate limiting is switched on
    /// together with the API key.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();

        let api_key = var(API_KEY_VAR).filter(|key| !key.trim().is_empty());
        let cors_origins = var(CORS_ORIGINS_VAR).map(|list| parse_origins(&list));
        let limit = var(RATE_LIMIT_VAR)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT);

        let mut config = Self {
            cors_origins,
            ..Self::disabled()
        };
        if let Some(key) = api_key {
            tracing::info!(limit, "Catalog API requires a bearer key");
            config.api_key = Some(key);
            config.rate_limiter = Some(RateLimiter::new(limit, RATE_WINDOW));
        }
        config
    }

    /// Open access from any origin.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::disabled()
        }
    }

    pub fn with_cors_origins(origins: Vec<String>) -> Self {
        Self {
            cors_origins: Some(origins),
            ..Self::disabled()
        }
    }

    pub fn with_rate_limit(max_requests: u32) -> Self {
        Self {
            rate_limiter: Some(RateLimiter::new(max_requests, RATE_WINDOW)),
            ..Self::disabled()
        }
    }
}

fn parse_origins(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
struct Window {
    opened: Instant,
    hits: u32,
}

/// Fixed-window request counter keyed by client IP.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request from `ip`. False once the client is over its quota.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut clients = self.clients();
        let window = clients.entry(ip).or_insert(Window { opened: now, hits: 0 });

        if now.duration_since(window.opened) >= self.window {
            *window = Window { opened: now, hits: 0 };
        }
        if window.hits >= self.max_requests {
            return false;
        }
        window.hits += 1;
        true
    }

    /// Drop clients whose window has closed.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, window| now.duration_since(window.opened) < self.window);
        tracing::trace!(dropped = before - clients.len(), "Rate limiter cleanup");
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<IpAddr, Window>> {
        self.clients.lock().expect("rate limiter lock poisoned")
    }
}

/// Reject requests that do not carry `Authorization: Bearer <api key>`.
pub async fn auth_middleware(
    State(config): State<SecurityConfig>,
    request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let Some(expected) = config.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    match bearer_token(request.headers()).map(|token| token == expected) {
        Ok(true) => Ok(next.run(request).await),
        Ok(false) => Err(unauthorized("invalid API key")),
        Err(reason) => Err(unauthorized(reason)),
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or("missing Authorization header")?
        .to_str()
        .map_err(|_| "unreadable Authorization header")?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or("Authorization header is not a bearer token")
}

fn unauthorized(reason: &str) -> Rejection {
    tracing::warn!(reason, "Rejected unauthenticated request");
    (StatusCode::UNAUTHORIZED, reason.to_string())
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let ip = client_ip(request.headers());
    if limiter.check(ip) {
        return Ok(next.run(request).await);
    }
    tracing::warn!(%ip, "Rate limit exceeded");
    Err((
        StatusCode::TOO_MANY_REQUESTS,
        format!("more than {} requests per window", limiter.max_requests),
    ))
}

/// First parseable address from the proxy headers, else localhost.
fn client_ip(headers: &HeaderMap) -> IpAddr {
    ["X-Forwarded-For", "X-Real-IP"]
        .into_iter()
        .filter_map(|name| headers.get(name)?.to_str().ok())
        .filter_map(|value| value.split(',').next()?.trim().parse::<IpAddr>().ok())
        .next()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
