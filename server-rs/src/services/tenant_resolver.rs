use crate::error::AppResult;
use crate::models::organization::TenantRecord;
use crate::services::rewrite::SiteTenant;
use crate::store::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Tenant(SiteTenant),
    RedirectRoot,
}

/// Store failures resolve to "unknown tenant" so routing fails closed.
fn fail_closed(result: AppResult<Option<TenantRecord>>, key: &str) -> Option<TenantRecord> {
    match result {
        Ok(row) => row,
        Err(e) => {
            tracing::error!(host_key = key, error = %e, "Tenant lookup failed");
            None
        }
    }
}

pub async fn resolve_subdomain(store: &dyn TenantStore, subdomain: &str) -> Resolution {
    match fail_closed(store.find_by_subdomain(subdomain).await, subdomain) {
        Some(org) => Resolution::Tenant(SiteTenant {
            organization_id: org.id,
            subdomain: org.subdomain,
            via_custom_domain: None,
        }),
        None => {
            tracing::debug!(subdomain, "Unknown subdomain");
            Resolution::RedirectRoot
        }
    }
}

/// Unknown and unverified domains are deliberately indistinguishable.
pub async fn resolve_custom_domain(store: &dyn TenantStore, host: &str) -> Resolution {
    let mut row = fail_closed(store.find_by_custom_domain(host).await, host);
    if row.is_none() {
        if let Some(bare) = host.strip_prefix("www.") {
            row = fail_closed(store.find_by_custom_domain(bare).await, bare);
        }
    }

    match row {
        Some(org) if org.domain_verified => {
            let domain = org.custom_domain.unwrap_or_else(|| host.to_string());
            Resolution::Tenant(SiteTenant {
                organization_id: org.id,
                subdomain: org.subdomain,
                via_custom_domain: Some(domain),
            })
        }
        _ => {
            tracing::debug!(host, "Unknown or unverified custom domain");
            Resolution::RedirectRoot
        }
    }
}
