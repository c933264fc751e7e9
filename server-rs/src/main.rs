use axum::{
    http::HeaderValue,
    middleware as axum_mw,
    routing::{delete, get, patch, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod db;
mod error;
mod middleware;
mod models;
mod outcome;
mod routes;
mod services;
mod store;
#[cfg(test)]
mod test_support;

use config::Config;
use middleware::rate_limit::RateLimiter;
use services::cloudinary::CloudinarySigner;
use services::dns::{DnsResolver, DohResolver};
use services::email::EmailClient;
use services::stripe_service::StripeClient;
use services::vercel::{HostingPlatform, VercelClient};
use store::{PgTenantStore, TenantStore};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub tenants: Arc<dyn TenantStore>,
    pub dns: Arc<dyn DnsResolver>,
    pub config: Arc<Config>,
    pub stripe: Option<StripeClient>,
    pub hosting: Option<Arc<dyn HostingPlatform>>,
    pub email: Option<EmailClient>,
    pub cloudinary: Option<CloudinarySigner>,
    pub rate_limiter: RateLimiter,
}

fn build_router(state: AppState) -> Router {
    // --- Routes the host router leaves untouched ---
    let api_routes = Router::new()
        .route("/health", get(routes::health::health))
        .route("/webhooks/stripe", post(routes::webhooks::stripe_webhook));

    let account_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/onboarding", post(routes::onboarding::create_organization))
        .route("/dashboard", get(routes::organizations::list_mine))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let invite_routes = Router::new()
        .route("/onboarding/subdomain", get(routes::onboarding::check_subdomain))
        .route(
            "/invite/:token",
            post(routes::members::accept_invitation)
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::auth::authenticate,
                ))
                .get(routes::members::show_invitation),
        );

    // --- Organization dashboard (member of :org_id) ---
    let dashboard_routes = Router::new()
        .route(
            "/dashboard/:org_id",
            get(routes::organizations::get_org).patch(routes::organizations::update_org),
        )
        .route("/dashboard/:org_id/members", get(routes::members::list_members))
        .route(
            "/dashboard/:org_id/members/:user_id",
            patch(routes::members::update_member).delete(routes::members::remove_member),
        )
        .route(
            "/dashboard/:org_id/invitations",
            get(routes::members::list_invitations).post(routes::members::create_invitation),
        )
        .route(
            "/dashboard/:org_id/invitations/:invitation_id",
            delete(routes::members::revoke_invitation),
        )
        .route(
            "/dashboard/:org_id/domain",
            get(routes::domains::status)
                .post(routes::domains::add)
                .delete(routes::domains::remove),
        )
        .route("/dashboard/:org_id/domain/verify", post(routes::domains::verify))
        .route(
            "/dashboard/:org_id/teams",
            get(routes::roster::list_teams).post(routes::roster::create_team),
        )
        .route(
            "/dashboard/:org_id/teams/:team_id",
            get(routes::roster::get_team)
                .patch(routes::roster::update_team)
                .delete(routes::roster::delete_team),
        )
        .route(
            "/dashboard/:org_id/players",
            get(routes::roster::list_players).post(routes::roster::create_player),
        )
        .route(
            "/dashboard/:org_id/players/:player_id",
            patch(routes::roster::update_player).delete(routes::roster::delete_player),
        )
        .route(
            "/dashboard/:org_id/coaches",
            get(routes::roster::list_coaches).post(routes::roster::create_coach),
        )
        .route(
            "/dashboard/:org_id/coaches/:coach_id",
            patch(routes::roster::update_coach).delete(routes::roster::delete_coach),
        )
        .route(
            "/dashboard/:org_id/events",
            get(routes::schedule::list_events).post(routes::schedule::create_event),
        )
        .route(
            "/dashboard/:org_id/events/:event_id",
            patch(routes::schedule::update_event).delete(routes::schedule::delete_event),
        )
        .route(
            "/dashboard/:org_id/games",
            get(routes::schedule::list_games).post(routes::schedule::create_game),
        )
        .route(
            "/dashboard/:org_id/games/:game_id",
            delete(routes::schedule::delete_game),
        )
        .route(
            "/dashboard/:org_id/games/:game_id/score",
            patch(routes::schedule::update_score),
        )
        .route(
            "/dashboard/:org_id/posts",
            get(routes::content::list_posts).post(routes::content::create_post),
        )
        .route(
            "/dashboard/:org_id/posts/:post_id",
            patch(routes::content::update_post).delete(routes::content::delete_post),
        )
        .route(
            "/dashboard/:org_id/sponsors",
            get(routes::content::list_sponsors).post(routes::content::create_sponsor),
        )
        .route(
            "/dashboard/:org_id/sponsors/:sponsor_id",
            patch(routes::content::update_sponsor).delete(routes::content::delete_sponsor),
        )
        .route("/dashboard/:org_id/billing", get(routes::billing::summary))
        .route("/dashboard/:org_id/billing/checkout", post(routes::billing::checkout))
        .route("/dashboard/:org_id/billing/portal", post(routes::billing::portal))
        .route(
            "/dashboard/:org_id/uploads/signature",
            post(routes::uploads::signature),
        )
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::membership::require_member,
        ))
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Namespaces only reachable through host rewriting ---
    let site_routes = Router::new()
        .route("/sites/:subdomain", get(routes::sites::home))
        .route("/sites/:subdomain/teams", get(routes::sites::teams))
        .route("/sites/:subdomain/teams/:team_id", get(routes::sites::team))
        .route("/sites/:subdomain/schedule", get(routes::sites::schedule))
        .route("/sites/:subdomain/games", get(routes::sites::games))
        .route("/sites/:subdomain/blog", get(routes::sites::blog))
        .route("/sites/:subdomain/blog/:slug", get(routes::sites::post))
        .route("/sites/:subdomain/sponsors", get(routes::sites::sponsors));

    let marketing_routes = Router::new()
        .route("/marketing", get(routes::marketing::home))
        .route("/marketing/pricing", get(routes::marketing::pricing))
        .route("/marketing/*rest", get(routes::marketing::not_found));

    Router::new()
        .nest("/api", api_routes)
        .merge(account_routes)
        .merge(invite_routes)
        .merge(dashboard_routes)
        .merge(site_routes)
        .merge(marketing_routes)
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// The full service: host routing runs before the router so tenant and
/// marketing rewrites decide which route matches.
fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .fallback_service(build_router(state.clone()))
        .layer(axum_mw::from_fn_with_state(
            state,
            middleware::host_routing::host_routing,
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    config.warn_missing_integrations();

    let pool = match db::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to Postgres");
            std::process::exit(1);
        }
    };
    let dns = match DohResolver::new(&config.dns) {
        Ok(dns) => dns,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build DNS-over-HTTPS client");
            std::process::exit(1);
        }
    };

    let state = AppState {
        tenants: Arc::new(PgTenantStore::new(pool.clone())),
        db: pool,
        dns: Arc::new(dns),
        stripe: StripeClient::new(&config.stripe),
        hosting: VercelClient::new(&config.vercel)
            .map(|client| Arc::new(client) as Arc<dyn HostingPlatform>),
        email: EmailClient::new(&config.email),
        cloudinary: CloudinarySigner::new(&config.cloudinary),
        rate_limiter: RateLimiter::from_config(&config.rate_limit),
        config: Arc::new(config),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(
        %addr,
        root_domain = %state.config.routing.root_domain,
        env = %state.config.app_env,
        "TallyRoster API listening"
    );

    let app = build_app(state);
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %e, "Server error");
    }
}
