use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::config::RoutingConfig;
use crate::services::hostname::{classify, Classification};
use crate::services::rewrite::{
    cache_tags, marketing_path, site_path, with_path_and_query, RewriteError, CACHE_TAGS_HEADER,
};
use crate::services::tenant_resolver::{resolve_custom_domain, resolve_subdomain, Resolution};
use crate::AppState;

fn request_host(req: &Request) -> Option<String> {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.as_str().to_string()))
}

fn rewrite(req: &mut Request, path_and_query: &str) -> Result<(), RewriteError> {
    let uri = with_path_and_query(req.uri(), path_and_query)?;
    *req.uri_mut() = uri;
    Ok(())
}

fn redirect_root(routing: &RoutingConfig) -> Response {
    Redirect::temporary(&routing.root_url()).into_response()
}

/// Maps the Host header onto the router's namespaces before routing:
/// root host paths go under `/marketing`, tenant hosts under
/// `/sites/{subdomain}`, everything unresolvable is redirected to the root
/// domain. Must wrap the whole router so the router sees the rewritten URI.
pub async fn host_routing(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let routing = &state.config.routing;
    let host = request_host(&req);
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let resolution = match classify(host.as_deref(), req.uri().path(), routing) {
        Classification::Bypass | Classification::ReservedApp => return next.run(req).await,
        Classification::Marketing => {
            if let Err(e) = rewrite(&mut req, &marketing_path(&path_and_query)) {
                tracing::warn!(error = %e, "Marketing rewrite failed");
                return redirect_root(routing);
            }
            return next.run(req).await;
        }
        Classification::Subdomain(subdomain) => {
            resolve_subdomain(state.tenants.as_ref(), &subdomain).await
        }
        Classification::CustomDomain(domain) => {
            resolve_custom_domain(state.tenants.as_ref(), &domain).await
        }
        Classification::Invalid => Resolution::RedirectRoot,
    };

    let tenant = match resolution {
        Resolution::Tenant(tenant) => tenant,
        Resolution::RedirectRoot => return redirect_root(routing),
    };

    if let Err(e) = rewrite(&mut req, &site_path(&tenant.subdomain, &path_and_query)) {
        tracing::warn!(subdomain = tenant.subdomain, error = %e, "Site rewrite failed");
        return redirect_root(routing);
    }

    let tags = cache_tags(&tenant);
    req.extensions_mut().insert(tenant);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&tags) {
        response.headers_mut().insert(CACHE_TAGS_HEADER, value);
    }
    response
}
