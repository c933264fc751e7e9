pub const MIN_LEN: usize = 3;
pub const MAX_LEN: usize = 20;

pub const RESERVED_SUBDOMAINS: &[&str] = &[
    "www",
    "api",
    "admin",
    "app",
    "mail",
    "ftp",
    "smtp",
    "auth",
    "dashboard",
    "onboarding",
    "invite",
    "marketing",
    "sites",
    "static",
    "blog",
    "help",
    "support",
    "status",
    "docs",
    "billing",
    "dev",
    "staging",
    "test",
    "root",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubdomainError {
    #[error("Subdomain must be between {} and {} characters", MIN_LEN, MAX_LEN)]
    Length,
    #[error("Subdomain may only contain lowercase letters and numbers")]
    Characters,
    #[error("Subdomain is reserved")]
    Reserved,
}

impl From<SubdomainError> for crate::error::AppError {
    fn from(e: SubdomainError) -> Self {
        crate::error::AppError::BadRequest(e.to_string())
    }
}

pub fn normalize_subdomain(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Normalizes then validates; returns the value to store.
pub fn validate_subdomain(raw: &str, product_slug: &str) -> Result<String, SubdomainError> {
    let subdomain = normalize_subdomain(raw);

    let len = subdomain.chars().count();
    if !(MIN_LEN..=MAX_LEN).contains(&len) {
        return Err(SubdomainError::Length);
    }
    if !subdomain
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(SubdomainError::Characters);
    }
    if RESERVED_SUBDOMAINS.contains(&subdomain.as_str()) || subdomain == product_slug {
        return Err(SubdomainError::Reserved);
    }
    Ok(subdomain)
}
