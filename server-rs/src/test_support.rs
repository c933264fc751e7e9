use std::sync::Arc;

use crate::config::Config;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::dns::fake::StaticResolver;
use crate::store::memory::MemoryTenantStore;
use crate::AppState;

pub const JWT_SECRET: &str = "test-secret";

pub fn config(development: bool) -> Config {
    Config::from_lookup(move |key| match key {
        "APP_ENV" if !development => Some("production".to_string()),
        "AUTH_JWT_SECRET" => Some(JWT_SECRET.to_string()),
        _ => None,
    })
}

/// App state over in-memory tenants and canned DNS. The pool connects
/// lazily and is never touched by routing tests.
pub fn state(store: MemoryTenantStore, dns: StaticResolver, development: bool) -> AppState {
    let config = config(development);
    let db = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy(&config.database_url())
        .unwrap();
    AppState {
        db,
        tenants: Arc::new(store),
        dns: Arc::new(dns),
        rate_limiter: RateLimiter::new(1_000, 60),
        stripe: None,
        hosting: None,
        email: None,
        cloudinary: None,
        config: Arc::new(config),
    }
}
