use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::middleware::auth::user_id_from_headers;
use crate::AppState;

/// Fixed-window counter per client key, holding at most `max_clients`
/// windows.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, WindowEntry>>>,
    max_requests: u32,
    window: Duration,
    max_clients: usize,
    trust_proxy: bool,
}

struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_secs),
            max_clients: 10_000,
            trust_proxy: false,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window_secs)
            .with_capacity(config.max_clients)
            .trusting_proxy(config.trust_proxy)
    }

    pub fn with_capacity(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients.max(1);
        self
    }

    pub fn trusting_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub async fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;
        if !windows.contains_key(key) && windows.len() >= self.max_clients {
            windows.retain(|_, e| e.reset_at > now);
            if windows.len() >= self.max_clients {
                let oldest = windows
                    .iter()
                    .min_by_key(|(_, e)| e.reset_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    windows.remove(&oldest);
                }
            }
        }

        let entry = windows.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            reset_at: now + self.window,
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }

        entry.count += 1;
        entry.count <= self.max_requests
    }
}

fn client_key(state: &AppState, req: &Request) -> String {
    if let Some(user_id) = user_id_from_headers(req.headers(), &state.config.auth) {
        return format!("user:{user_id}");
    }
    // Clients set X-Forwarded-For freely, so it only counts behind a
    // proxy that rewrites it.
    if state.rate_limiter.trust_proxy {
        if let Some(ip) = forwarded_for(req) {
            return format!("ip:{ip}");
        }
    }
    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

fn forwarded_for(req: &Request) -> Option<&str> {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&state, &req);
    if !state.rate_limiter.check(&key).await {
        tracing::debug!(key, "Rate limit exceeded");
        return Err(AppError::RateLimited);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dns::fake::StaticResolver;
    use crate::store::memory::MemoryTenantStore;
    use crate::test_support;
    use axum::body::Body;

    fn request_from(peer: &str, forwarded: &str) -> Request {
        let mut req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", forwarded)
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(2, 60);
        let start = Instant::now();
        assert!(limiter.check_at("ip:1", start).await);
        assert!(limiter.check_at("ip:1", start).await);
        assert!(!limiter.check_at("ip:1", start).await);
        assert!(limiter.check_at("ip:2", start).await);
        assert!(limiter.check_at("ip:1", start + Duration::from_secs(61)).await);
    }

    #[tokio::test]
    async fn forged_forwarded_for_does_not_change_the_key() {
        let state = test_support::state(MemoryTenantStore::new(), StaticResolver::new(), true);
        let first = client_key(&state, &request_from("203.0.113.7:5000", "1.1.1.1"));
        let second = client_key(&state, &request_from("203.0.113.7:5001", "2.2.2.2"));
        assert_eq!(first, "ip:203.0.113.7");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn trusted_proxy_keys_by_forwarded_for() {
        let mut state = test_support::state(MemoryTenantStore::new(), StaticResolver::new(), true);
        state.rate_limiter = RateLimiter::new(10, 60).trusting_proxy(true);
        let key = client_key(&state, &request_from("10.0.0.1:443", "198.51.100.4, 10.0.0.1"));
        assert_eq!(key, "ip:198.51.100.4");
    }

    #[tokio::test]
    async fn rotating_clients_stay_within_capacity() {
        let limiter = RateLimiter::new(1, 60).with_capacity(100);
        let start = Instant::now();
        for i in 0..1_000 {
            assert!(limiter.check_at(&format!("ip:{i}"), start).await);
        }
        assert!(limiter.windows.lock().await.len() <= 100);

        // A client still inside its window keeps its count.
        assert!(!limiter.check_at("ip:999", start).await);
    }
}
