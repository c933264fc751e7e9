use crate::config::RoutingConfig;

/// Paths served as-is on every host.
pub const BYPASS_PREFIXES: &[&str] = &[
    "/api",
    "/static",
    "/_internal",
    "/favicon.ico",
    "/robots.txt",
    "/sitemap.xml",
];

/// App routes left untouched on the root domain.
pub const RESERVED_APP_PREFIXES: &[&str] = &["/auth", "/dashboard", "/onboarding", "/invite"];

pub const MARKETING_PREFIX: &str = "/marketing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Bypass,
    ReservedApp,
    Marketing,
    Subdomain(String),
    CustomDomain(String),
    /// Host that can never map to a tenant; redirected to the root domain.
    Invalid,
}

/// Segment-aware prefix match: `/dashboard` matches `/dashboard` and
/// `/dashboard/x`, never `/dashboards`.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Lowercases and drops the port and any trailing dot.
pub fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains(|c: char| c.is_whitespace() || "/@?#".contains(c)) {
        return None;
    }

    let host = if raw.starts_with('[') {
        // IPv6 literal, optionally followed by :port
        let end = raw.find(']')?;
        let rest = &raw[end + 1..];
        if !rest.is_empty() && !is_port_suffix(rest) {
            return None;
        }
        &raw[..=end]
    } else {
        match raw.rsplit_once(':') {
            Some((host, port)) if is_port_suffix(&format!(":{port}")) => host,
            Some(_) => return None,
            None => raw,
        }
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn is_port_suffix(s: &str) -> bool {
    s.strip_prefix(':')
        .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "0.0.0.0") || host.ends_with(".localhost")
}

fn is_root_host(host: &str, config: &RoutingConfig) -> bool {
    let root = config.root_domain.as_str();
    if host == root || host.strip_prefix("www.") == Some(root) {
        return true;
    }
    config.development && matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "0.0.0.0")
}

pub fn classify(host: Option<&str>, path: &str, config: &RoutingConfig) -> Classification {
    if BYPASS_PREFIXES.iter().any(|p| path_has_prefix(path, p)) {
        return Classification::Bypass;
    }

    let Some(host) = host.and_then(normalize_host) else {
        return Classification::Invalid;
    };

    if is_root_host(&host, config) {
        return if RESERVED_APP_PREFIXES.iter().any(|p| path_has_prefix(path, p)) {
            Classification::ReservedApp
        } else {
            Classification::Marketing
        };
    }

    let root_suffix = format!(".{}", config.root_domain);
    let local = is_local_host(&host);

    let remainder = if let Some(rest) = host.strip_suffix(&root_suffix) {
        rest
    } else if local {
        match host.strip_suffix(".localhost") {
            Some(rest) if config.development => rest,
            _ => return Classification::Invalid,
        }
    } else {
        return Classification::CustomDomain(host);
    };

    let subdomain = remainder.strip_prefix("www.").unwrap_or(remainder);
    if subdomain.is_empty() || subdomain == "www" {
        Classification::Invalid
    } else {
        Classification::Subdomain(subdomain.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production() -> RoutingConfig {
        RoutingConfig {
            root_domain: "tallyroster.com".to_string(),
            product_slug: "tallyroster".to_string(),
            development: false,
            port: 3000,
        }
    }

    fn development() -> RoutingConfig {
        RoutingConfig {
            development: true,
            ..production()
        }
    }

    #[test]
    fn normalizes_hosts() {
        assert_eq!(normalize_host("Eagles.TallyRoster.com:443").as_deref(), Some("eagles.tallyroster.com"));
        assert_eq!(normalize_host("myteam.com.").as_deref(), Some("myteam.com"));
        assert_eq!(normalize_host("[::1]:3000").as_deref(), Some("[::1]"));
        assert_eq!(normalize_host("localhost:3000").as_deref(), Some("localhost"));
        assert_eq!(normalize_host(""), None);
        assert_eq!(normalize_host("evil.com/path"), None);
        assert_eq!(normalize_host("user@evil.com"), None);
        assert_eq!(normalize_host("host:port"), None);
    }

    #[test]
    fn prefix_matching_is_segment_aware() {
        assert!(path_has_prefix("/dashboard", "/dashboard"));
        assert!(path_has_prefix("/dashboard/abc", "/dashboard"));
        assert!(!path_has_prefix("/dashboards", "/dashboard"));
        assert!(!path_has_prefix("/", "/dashboard"));
    }

    #[test]
    fn bypass_wins_over_everything() {
        let config = production();
        for host in [Some("tallyroster.com"), Some("eagles.tallyroster.com"), Some("myteam.com"), None] {
            assert_eq!(classify(host, "/api/health", &config), Classification::Bypass);
            assert_eq!(classify(host, "/static/app.css", &config), Classification::Bypass);
        }
    }

    #[test]
    fn root_domain_and_www_variant() {
        let config = production();
        for host in ["tallyroster.com", "www.tallyroster.com", "TALLYROSTER.COM:443"] {
            assert_eq!(classify(Some(host), "/", &config), Classification::Marketing);
            assert_eq!(classify(Some(host), "/pricing", &config), Classification::Marketing);
            assert_eq!(classify(Some(host), "/dashboard", &config), Classification::ReservedApp);
            assert_eq!(classify(Some(host), "/onboarding/x", &config), Classification::ReservedApp);
            assert_eq!(classify(Some(host), "/invite/tok", &config), Classification::ReservedApp);
            assert_eq!(classify(Some(host), "/auth/me", &config), Classification::ReservedApp);
        }
        assert_eq!(
            classify(Some("tallyroster.com"), "/dashboards", &config),
            Classification::Marketing
        );
    }

    #[test]
    fn localhost_is_root_only_in_development() {
        assert_eq!(
            classify(Some("localhost:3000"), "/", &development()),
            Classification::Marketing
        );
        assert_eq!(classify(Some("localhost"), "/", &production()), Classification::Invalid);
        assert_eq!(
            classify(Some("eagles.localhost:3000"), "/teams", &development()),
            Classification::Subdomain("eagles".to_string())
        );
        assert_eq!(
            classify(Some("eagles.localhost"), "/teams", &production()),
            Classification::Invalid
        );
    }

    #[test]
    fn tenant_subdomains() {
        let config = production();
        assert_eq!(
            classify(Some("eagles.tallyroster.com"), "/teams", &config),
            Classification::Subdomain("eagles".to_string())
        );
        assert_eq!(
            classify(Some("Eagles.TallyRoster.com"), "/", &config),
            Classification::Subdomain("eagles".to_string())
        );
        assert_eq!(
            classify(Some("www.eagles.tallyroster.com"), "/", &config),
            Classification::Subdomain("eagles".to_string())
        );
        assert_eq!(
            classify(Some("www.www.tallyroster.com"), "/", &config),
            Classification::Invalid
        );
    }

    #[test]
    fn foreign_hosts_are_custom_domain_candidates() {
        let config = production();
        assert_eq!(
            classify(Some("myteam.com"), "/", &config),
            Classification::CustomDomain("myteam.com".to_string())
        );
        // Suffix match needs the dot boundary.
        assert_eq!(
            classify(Some("eviltallyroster.com"), "/", &config),
            Classification::CustomDomain("eviltallyroster.com".to_string())
        );
        assert_eq!(
            classify(Some("tallyroster.com.evil.net"), "/", &config),
            Classification::CustomDomain("tallyroster.com.evil.net".to_string())
        );
    }

    #[test]
    fn missing_host_is_invalid() {
        assert_eq!(classify(None, "/", &production()), Classification::Invalid);
        assert_eq!(classify(Some(" "), "/", &production()), Classification::Invalid);
    }
}
