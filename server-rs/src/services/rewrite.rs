use axum::http::uri::{InvalidUriParts, PathAndQuery, Uri};

use crate::services::hostname::{path_has_prefix, MARKETING_PREFIX};

pub const SITES_PREFIX: &str = "/sites";
pub const CACHE_TAGS_HEADER: &str = "x-cache-tags";

/// Tenant a request was routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteTenant {
    pub organization_id: uuid::Uuid,
    pub subdomain: String,
    /// Set when the request arrived through the tenant's custom domain.
    pub via_custom_domain: Option<String>,
}

fn split_query(path_and_query: &str) -> (&str, Option<&str>) {
    match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    }
}

fn prefixed(prefix: &str, path: &str, query: Option<&str>) -> String {
    let mut out = String::with_capacity(prefix.len() + path.len() + 16);
    out.push_str(prefix);
    if path != "/" && !path.is_empty() {
        if !path.starts_with('/') {
            out.push('/');
        }
        out.push_str(path);
    }
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    out
}

/// `/teams?x=1` on `eagles` becomes `/sites/eagles/teams?x=1`.
pub fn site_path(subdomain: &str, path_and_query: &str) -> String {
    let (path, query) = split_query(path_and_query);
    prefixed(&format!("{SITES_PREFIX}/{subdomain}"), path, query)
}

/// Prefixes `/marketing` once; already-prefixed paths are returned unchanged.
pub fn marketing_path(path_and_query: &str) -> String {
    let (path, query) = split_query(path_and_query);
    if path_has_prefix(path, MARKETING_PREFIX) {
        return path_and_query.to_string();
    }
    prefixed(MARKETING_PREFIX, path, query)
}

pub fn with_path_and_query(uri: &Uri, path_and_query: &str) -> Result<Uri, RewriteError> {
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|e| RewriteError(e.to_string()))?,
    );
    Uri::from_parts(parts).map_err(|e: InvalidUriParts| RewriteError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("invalid rewritten uri: {0}")]
pub struct RewriteError(String);

/// Tags downstream cache purging keys on.
pub fn cache_tags(tenant: &SiteTenant) -> String {
    let mut tags = format!("org:{},site:{}", tenant.organization_id, tenant.subdomain);
    if let Some(domain) = &tenant.via_custom_domain {
        tags.push_str(",domain:");
        tags.push_str(domain);
    }
    tags
}
