use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use uuid::Uuid;

use crate::config::RoutingConfig;
use crate::error::{AppError, AppResult};
use crate::models::organization::TenantRecord;
use crate::outcome::{Outcome, SideEffect};
use crate::services::dns::{same_host, unquote_txt, DnsResolver, RecordType};
use crate::services::vercel::HostingPlatform;
use crate::AppState;

pub const VERIFICATION_FAILED: &str =
    "Domain verification failed. Check your DNS settings and try again; DNS changes can take a while to propagate.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Domain is required")]
    Empty,
    #[error("'{0}' is not a valid domain name")]
    Invalid(String),
    #[error("Subdomains of {0} cannot be used as a custom domain")]
    PlatformDomain(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainState {
    None,
    Pending,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsInstructions {
    #[serde(rename = "cnameName")]
    pub cname_name: String,
    #[serde(rename = "cnameTarget")]
    pub cname_target: String,
    #[serde(rename = "txtName")]
    pub txt_name: String,
    #[serde(rename = "txtValue")]
    pub txt_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainStatus {
    pub state: DomainState,
    pub domain: Option<String>,
    #[serde(rename = "verifiedAt")]
    pub verified_at: Option<DateTime<Utc>>,
    pub instructions: Option<DnsInstructions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub cname: bool,
    pub txt: bool,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.cname || self.txt
    }
}

/// Strips protocol, path, port, trailing dots and a leading `www.`.
pub fn clean_domain(input: &str, root_domain: &str) -> Result<String, DomainError> {
    let mut domain = input.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            domain = rest.to_string();
        }
    }
    if let Some(end) = domain.find(['/', '?', '#']) {
        domain.truncate(end);
    }
    if let Some((host, port)) = domain.rsplit_once(':') {
        if port.chars().all(|c| c.is_ascii_digit()) {
            domain = host.to_string();
        }
    }
    let domain = domain.trim_end_matches('.');
    let domain = domain.strip_prefix("www.").unwrap_or(domain).to_string();

    if domain.is_empty() {
        return Err(DomainError::Empty);
    }
    if domain.len() > 253 || !domain.contains('.') {
        return Err(DomainError::Invalid(domain));
    }
    let labels_ok = domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    });
    if !labels_ok {
        return Err(DomainError::Invalid(domain));
    }
    if domain == root_domain || domain.ends_with(&format!(".{root_domain}")) {
        return Err(DomainError::PlatformDomain(root_domain.to_string()));
    }
    Ok(domain)
}

/// 128 bits from the OS CSPRNG, hex-encoded.
pub fn generate_verification_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn state_of(record: &TenantRecord) -> DomainState {
    match (&record.custom_domain, record.domain_verified) {
        (None, _) => DomainState::None,
        (Some(_), false) => DomainState::Pending,
        (Some(_), true) => DomainState::Verified,
    }
}

pub struct DomainWorkflow<'a> {
    store: &'a dyn crate::store::TenantStore,
    dns: &'a dyn DnsResolver,
    hosting: Option<&'a dyn HostingPlatform>,
    routing: &'a RoutingConfig,
}

impl<'a> DomainWorkflow<'a> {
    pub fn new(
        store: &'a dyn crate::store::TenantStore,
        dns: &'a dyn DnsResolver,
        hosting: Option<&'a dyn HostingPlatform>,
        routing: &'a RoutingConfig,
    ) -> Self {
        Self {
            store,
            dns,
            hosting,
            routing,
        }
    }

    pub fn from_state(state: &'a AppState) -> Self {
        Self::new(
            state.tenants.as_ref(),
            state.dns.as_ref(),
            state.hosting.as_deref(),
            &state.config.routing,
        )
    }

    async fn load(&self, organization_id: Uuid) -> AppResult<TenantRecord> {
        self.store
            .find_by_id(organization_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Organization not found".into()))
    }

    pub fn status_of(&self, record: &TenantRecord) -> DomainStatus {
        let state = state_of(record);
        let instructions = match (&record.custom_domain, &record.domain_verification_token) {
            (Some(domain), Some(token)) if state == DomainState::Pending => Some(DnsInstructions {
                cname_name: domain.clone(),
                cname_target: self.routing.site_host(&record.subdomain),
                txt_name: self.routing.verification_record_name(domain),
                txt_value: token.clone(),
            }),
            _ => None,
        };
        DomainStatus {
            state,
            domain: record.custom_domain.clone(),
            verified_at: record.domain_verified_at,
            instructions,
        }
    }

    pub async fn status(&self, organization_id: Uuid) -> AppResult<DomainStatus> {
        let record = self.load(organization_id).await?;
        Ok(self.status_of(&record))
    }

    /// `none|pending -> pending`. Re-adding the current domain is a no-op.
    pub async fn add(&self, organization_id: Uuid, raw_domain: &str) -> AppResult<Outcome<DomainStatus>> {
        let domain = clean_domain(raw_domain, &self.routing.root_domain)?;
        let current = self.load(organization_id).await?;

        if current.custom_domain.as_deref() == Some(domain.as_str()) {
            return Ok(Outcome::new(self.status_of(&current)));
        }

        let token = generate_verification_token();
        self.store
            .claim_custom_domain(organization_id, &domain, &token)
            .await?;
        tracing::info!(%organization_id, domain, "Custom domain added, pending verification");

        let updated = self.load(organization_id).await?;
        let mut outcome = Outcome::new(self.status_of(&updated));

        if let Some(hosting) = self.hosting {
            if let Some(old) = current.custom_domain.as_deref() {
                outcome.record(SideEffect::DomainRemoval, hosting.remove_domain(old).await);
            }
            outcome.record(SideEffect::DomainRegistration, hosting.add_domain(&domain).await);
        } else {
            tracing::debug!(domain, "Hosting platform not configured; skipping domain registration");
        }
        Ok(outcome)
    }

    /// `pending -> verified` when either the CNAME or the TXT check passes.
    pub async fn verify(&self, organization_id: Uuid) -> AppResult<Outcome<DomainStatus>> {
        let record = self.load(organization_id).await?;
        let domain = record
            .custom_domain
            .clone()
            .ok_or_else(|| AppError::BadRequest("No custom domain has been added".into()))?;

        if record.domain_verified {
            return Ok(Outcome::new(self.status_of(&record)));
        }

        let token = record.domain_verification_token.as_deref();
        let target = self.routing.site_host(&record.subdomain);
        let checks = self
            .run_checks(&domain, &target, token.unwrap_or_default())
            .await;

        if !checks.passed() {
            tracing::info!(%organization_id, domain, "Custom domain verification failed");
            return Err(AppError::VerificationFailed(VERIFICATION_FAILED.to_string()));
        }

        // The domain may have been replaced while DNS was being checked.
        let marked = self
            .store
            .mark_domain_verified(organization_id, &domain, token, Utc::now())
            .await?;
        if !marked {
            tracing::warn!(%organization_id, domain, "Custom domain changed during verification");
            return Err(AppError::Conflict(
                "The custom domain changed during verification; verify the new domain instead".into(),
            ));
        }
        tracing::info!(%organization_id, domain, cname = checks.cname, txt = checks.txt, "Custom domain verified");

        let updated = self.load(organization_id).await?;
        let mut outcome = Outcome::new(self.status_of(&updated));
        let ssl = match self.hosting {
            Some(hosting) => Some(hosting.check_domain_config(&domain).await),
            None => None,
        };
        outcome.record_optional(SideEffect::SslProvisioning, ssl);
        Ok(outcome)
    }

    pub async fn remove(&self, organization_id: Uuid) -> AppResult<Outcome<DomainStatus>> {
        let record = self.load(organization_id).await?;
        let Some(domain) = record.custom_domain.clone() else {
            return Ok(Outcome::new(self.status_of(&record)));
        };

        self.store.clear_custom_domain(organization_id).await?;
        tracing::info!(%organization_id, domain, "Custom domain removed");

        let updated = self.load(organization_id).await?;
        let mut outcome = Outcome::new(self.status_of(&updated));
        let removal = match self.hosting {
            Some(hosting) => Some(hosting.remove_domain(&domain).await),
            None => None,
        };
        outcome.record_optional(SideEffect::DomainRemoval, removal);
        Ok(outcome)
    }

    pub async fn run_checks(&self, domain: &str, target: &str, token: &str) -> CheckResult {
        let (cname, txt) = tokio::join!(
            self.check_cname(domain, target),
            self.check_txt(domain, token)
        );
        CheckResult { cname, txt }
    }

    /// CNAME on the apex or its `www` form pointing at `{sub}.{root}`.
    pub async fn check_cname(&self, domain: &str, target: &str) -> bool {
        let www = format!("www.{domain}");
        let (apex, www) = tokio::join!(
            self.lookup(domain, RecordType::Cname),
            self.lookup(&www, RecordType::Cname)
        );
        apex.iter().chain(www.iter()).any(|data| same_host(data, target))
    }

    /// TXT at `_{slug}-verify.{domain}` containing the stored token.
    pub async fn check_txt(&self, domain: &str, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let name = self.routing.verification_record_name(domain);
        self.lookup(&name, RecordType::Txt)
            .await
            .iter()
            .any(|data| unquote_txt(data).contains(token))
    }

    /// Lookup errors count as "no record".
    async fn lookup(&self, name: &str, record_type: RecordType) -> Vec<String> {
        match self.dns.lookup(name, record_type).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(name, record_type = record_type.as_str(), error = %e, "DNS lookup failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dns::fake::StaticResolver;
    use crate::services::dns::DnsError;
    use crate::services::vercel::fake::FailingPlatform;
    use crate::store::memory::MemoryTenantStore;
    use crate::store::TenantStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn routing() -> RoutingConfig {
        RoutingConfig {
            root_domain: "tallyroster.com".to_string(),
            product_slug: "tallyroster".to_string(),
            development: false,
            port: 3000,
        }
    }

    #[test]
    fn cleans_user_supplied_domains() {
        let root = "tallyroster.com";
        assert_eq!(clean_domain("myteam.com", root).unwrap(), "myteam.com");
        assert_eq!(clean_domain("https://www.MyTeam.com/", root).unwrap(), "myteam.com");
        assert_eq!(clean_domain("http://myteam.com:8080/about?x=1", root).unwrap(), "myteam.com");
        assert_eq!(clean_domain(" club.myteam.org. ", root).unwrap(), "club.myteam.org");
        assert_eq!(clean_domain("", root), Err(DomainError::Empty));
        assert_eq!(clean_domain("https://", root), Err(DomainError::Empty));
        assert!(matches!(clean_domain("localhost", root), Err(DomainError::Invalid(_))));
        assert!(matches!(clean_domain("my_team.com", root), Err(DomainError::Invalid(_))));
        assert!(matches!(clean_domain("-bad.com", root), Err(DomainError::Invalid(_))));
        assert!(matches!(clean_domain("a..com", root), Err(DomainError::Invalid(_))));
        assert!(matches!(
            clean_domain("eagles.tallyroster.com", root),
            Err(DomainError::PlatformDomain(_))
        ));
        assert!(matches!(
            clean_domain("www.tallyroster.com", root),
            Err(DomainError::PlatformDomain(_))
        ));
    }

    #[test]
    fn tokens_are_random_hex() {
        let a = generate_verification_token();
        let b = generate_verification_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn add_generates_token_and_instructions() {
        let store = MemoryTenantStore::new();
        let org = store.insert("eagles");
        let dns = StaticResolver::new();
        let routing = routing();
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);

        let outcome = workflow.add(org, "https://www.myteam.com/").await.unwrap();
        assert!(outcome.is_clean());
        let status = outcome.value;
        assert_eq!(status.state, DomainState::Pending);
        assert_eq!(status.domain.as_deref(), Some("myteam.com"));

        let instructions = status.instructions.unwrap();
        assert_eq!(instructions.cname_name, "myteam.com");
        assert_eq!(instructions.cname_target, "eagles.tallyroster.com");
        assert_eq!(instructions.txt_name, "_tallyroster-verify.myteam.com");
        assert_eq!(instructions.txt_value.len(), 32);

        let record = store.find_by_id(org).await.unwrap().unwrap();
        assert!(!record.domain_verified);
        assert_eq!(record.domain_verification_token.as_deref(), Some(instructions.txt_value.as_str()));

        // Re-adding the same domain keeps the token.
        let again = workflow.add(org, "myteam.com").await.unwrap();
        assert_eq!(again.value.instructions.unwrap().txt_value, instructions.txt_value);
    }

    #[tokio::test]
    async fn add_rejects_domain_claimed_by_another_org() {
        let store = MemoryTenantStore::new();
        store.insert_with_domain("hawks", "myteam.com", true);
        let org = store.insert("eagles");
        let dns = StaticResolver::new();
        let routing = routing();
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);

        let err = workflow.add(org, "www.myteam.com").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(workflow.status(org).await.unwrap().state, DomainState::None);
    }

    #[tokio::test]
    async fn txt_record_with_stored_token_verifies() {
        let store = MemoryTenantStore::new();
        let org = store.insert("eagles");
        let routing = routing();

        let setup = StaticResolver::new();
        let token = DomainWorkflow::new(&store, &setup, None, &routing)
            .add(org, "myteam.com")
            .await
            .unwrap()
            .value
            .instructions
            .unwrap()
            .txt_value;

        let dns = StaticResolver::new().with(
            "_tallyroster-verify.myteam.com",
            RecordType::Txt,
            &format!("\"{token}\""),
        );
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);
        let outcome = workflow.verify(org).await.unwrap();
        assert_eq!(outcome.value.state, DomainState::Verified);
        assert!(outcome.value.verified_at.is_some());
        assert!(outcome.value.instructions.is_none());
        assert!(store.find_by_id(org).await.unwrap().unwrap().domain_verified);
    }

    #[tokio::test]
    async fn txt_record_with_other_token_does_not_verify() {
        let store = MemoryTenantStore::new();
        let org = store.insert("eagles");
        let routing = routing();
        let setup = StaticResolver::new();
        DomainWorkflow::new(&store, &setup, None, &routing)
            .add(org, "myteam.com")
            .await
            .unwrap();

        let dns = StaticResolver::new().with(
            "_tallyroster-verify.myteam.com",
            RecordType::Txt,
            "\"unrelated-value\"",
        );
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);
        let err = workflow.verify(org).await.unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));

        let record = store.find_by_id(org).await.unwrap().unwrap();
        assert!(!record.domain_verified);
        assert!(record.domain_verified_at.is_none());
    }

    #[tokio::test]
    async fn cname_on_www_form_is_enough() {
        let store = MemoryTenantStore::new();
        let org = store.insert("eagles");
        let routing = routing();
        let setup = StaticResolver::new();
        DomainWorkflow::new(&store, &setup, None, &routing)
            .add(org, "myteam.com")
            .await
            .unwrap();

        let dns = StaticResolver::new().with(
            "www.myteam.com",
            RecordType::Cname,
            "Eagles.TallyRoster.com.",
        );
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);
        let outcome = workflow.verify(org).await.unwrap();
        assert_eq!(outcome.value.state, DomainState::Verified);
    }

    #[tokio::test]
    async fn cname_to_another_tenant_fails() {
        let store = MemoryTenantStore::new();
        let routing = routing();
        let dns = StaticResolver::new().with("myteam.com", RecordType::Cname, "hawks.tallyroster.com.");
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);
        assert!(!workflow.check_cname("myteam.com", "eagles.tallyroster.com").await);
        assert!(workflow.check_cname("myteam.com", "hawks.tallyroster.com").await);
    }

    #[tokio::test]
    async fn dns_errors_are_treated_as_not_verified() {
        let store = MemoryTenantStore::new();
        let org = store.insert("eagles");
        let routing = routing();
        let setup = StaticResolver::new();
        DomainWorkflow::new(&store, &setup, None, &routing)
            .add(org, "myteam.com")
            .await
            .unwrap();

        let dns = StaticResolver::failing();
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);
        let err = workflow.verify(org).await.unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));
        // Apex CNAME, www CNAME and TXT were all attempted.
        assert_eq!(dns.call_count(), 3);
    }

    #[tokio::test]
    async fn verify_without_domain_is_bad_request_and_verified_is_idempotent() {
        let store = MemoryTenantStore::new();
        let org = store.insert("eagles");
        let routing = routing();
        let dns = StaticResolver::new();
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);
        assert!(matches!(workflow.verify(org).await, Err(AppError::BadRequest(_))));

        let verified = store.insert_with_domain("hawks", "hawks.org", true);
        let outcome = workflow.verify(verified).await.unwrap();
        assert_eq!(outcome.value.state, DomainState::Verified);
        assert_eq!(dns.call_count(), 0);
    }

    #[tokio::test]
    async fn remove_returns_to_none() {
        let store = MemoryTenantStore::new();
        let org = store.insert_with_domain("eagles", "myteam.com", true);
        let routing = routing();
        let dns = StaticResolver::new();
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);

        let outcome = workflow.remove(org).await.unwrap();
        assert_eq!(outcome.value.state, DomainState::None);
        assert!(store.find_by_custom_domain("myteam.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn txt_record_containing_the_token_verifies() {
        let store = MemoryTenantStore::new();
        let org = store.insert("eagles");
        let routing = routing();
        let setup = StaticResolver::new();
        let token = DomainWorkflow::new(&store, &setup, None, &routing)
            .add(org, "myteam.com")
            .await
            .unwrap()
            .value
            .instructions
            .unwrap()
            .txt_value;

        let dns = StaticResolver::new().with(
            "_tallyroster-verify.myteam.com",
            RecordType::Txt,
            &format!("\"tallyroster-verify={token}\""),
        );
        let workflow = DomainWorkflow::new(&store, &dns, None, &routing);
        assert!(workflow.check_txt("myteam.com", &token).await);
        let outcome = workflow.verify(org).await.unwrap();
        assert_eq!(outcome.value.state, DomainState::Verified);
    }

    /// Answers the TXT check with the original token after the
    /// organization has already switched to another domain.
    struct DomainSwitchingResolver {
        store: Arc<MemoryTenantStore>,
        organization_id: Uuid,
        token: String,
    }

    #[async_trait]
    impl DnsResolver for DomainSwitchingResolver {
        async fn lookup(&self, _name: &str, record_type: RecordType) -> Result<Vec<String>, DnsError> {
            if record_type != RecordType::Txt {
                return Ok(Vec::new());
            }
            self.store
                .claim_custom_domain(self.organization_id, "victim.com", "replacement-token")
                .await
                .unwrap();
            Ok(vec![self.token.clone()])
        }
    }

    #[tokio::test]
    async fn domain_replaced_during_checks_is_not_verified() {
        let store = Arc::new(MemoryTenantStore::new());
        let org = store.insert("eagles");
        let routing = routing();
        let setup = StaticResolver::new();
        let token = DomainWorkflow::new(store.as_ref(), &setup, None, &routing)
            .add(org, "myteam.com")
            .await
            .unwrap()
            .value
            .instructions
            .unwrap()
            .txt_value;

        let dns = DomainSwitchingResolver {
            store: store.clone(),
            organization_id: org,
            token,
        };
        let workflow = DomainWorkflow::new(store.as_ref(), &dns, None, &routing);
        let err = workflow.verify(org).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let record = store.find_by_id(org).await.unwrap().unwrap();
        assert_eq!(record.custom_domain.as_deref(), Some("victim.com"));
        assert!(!record.domain_verified);
        assert!(record.domain_verified_at.is_none());
        assert!(store.find_by_custom_domain("myteam.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_registration_keeps_domain_pending_with_warning() {
        let store = MemoryTenantStore::new();
        let org = store.insert("eagles");
        let routing = routing();
        let dns = StaticResolver::new();
        let hosting = FailingPlatform::default();
        let workflow = DomainWorkflow::new(&store, &dns, Some(&hosting), &routing);

        let outcome = workflow.add(org, "myteam.com").await.unwrap();
        assert_eq!(outcome.value.state, DomainState::Pending);
        assert_eq!(outcome.side_effects.len(), 1);
        assert_eq!(outcome.side_effects[0].effect, SideEffect::DomainRegistration);
        assert!(outcome.side_effects[0].message.contains("502"));

        let record = store.find_by_id(org).await.unwrap().unwrap();
        assert_eq!(record.custom_domain.as_deref(), Some("myteam.com"));
        assert!(!record.domain_verified);
        assert_eq!(*hosting.calls.lock().unwrap(), vec!["add myteam.com".to_string()]);
    }

    #[tokio::test]
    async fn failed_ssl_check_still_verifies_with_warning() {
        let store = MemoryTenantStore::new();
        let org = store.insert("eagles");
        let routing = routing();
        let setup = StaticResolver::new();
        DomainWorkflow::new(&store, &setup, None, &routing)
            .add(org, "myteam.com")
            .await
            .unwrap();

        let dns = StaticResolver::new().with("myteam.com", RecordType::Cname, "eagles.tallyroster.com");
        let hosting = FailingPlatform::default();
        let workflow = DomainWorkflow::new(&store, &dns, Some(&hosting), &routing);

        let outcome = workflow.verify(org).await.unwrap();
        assert_eq!(outcome.value.state, DomainState::Verified);
        assert_eq!(outcome.side_effects.len(), 1);
        assert_eq!(outcome.side_effects[0].effect, SideEffect::SslProvisioning);
        assert!(store.find_by_id(org).await.unwrap().unwrap().domain_verified);
    }
}
