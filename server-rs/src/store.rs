use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::organization::{NewOrganization, Organization, TenantRecord};

const TENANT_COLUMNS: &str =
    "id, subdomain, custom_domain, domain_verified, domain_verification_token, domain_verified_at";

/// Organization reads and writes shared by host routing, onboarding and
/// the custom domain workflow.
#[async_trait]
pub trait TenantStore: Send + Sync + 'static {
    async fn find_by_subdomain(&self, subdomain: &str) -> AppResult<Option<TenantRecord>>;

    async fn find_by_custom_domain(&self, domain: &str) -> AppResult<Option<TenantRecord>>;

    async fn find_by_id(&self, organization_id: Uuid) -> AppResult<Option<TenantRecord>>;

    /// Inserts the organization and makes the owner its admin.
    /// Returns `None` when the subdomain is already taken.
    async fn create_organization(&self, new: NewOrganization) -> AppResult<Option<Organization>>;

    /// Sets a pending custom domain. `Conflict` when another organization
    /// holds the same domain.
    async fn claim_custom_domain(
        &self,
        organization_id: Uuid,
        domain: &str,
        token: &str,
    ) -> AppResult<()>;

    /// Marks the domain verified only while the organization still holds
    /// `domain` with `token`. Returns `false` when either changed.
    async fn mark_domain_verified(
        &self,
        organization_id: Uuid,
        domain: &str,
        token: Option<&str>,
        verified_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn clear_custom_domain(&self, organization_id: Uuid) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgTenantStore {
    db: PgPool,
}

impl PgTenantStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn find_by_subdomain(&self, subdomain: &str) -> AppResult<Option<TenantRecord>> {
        let row = sqlx::query_as::<_, TenantRecord>(&format!(
            "SELECT {TENANT_COLUMNS} FROM organizations WHERE subdomain = $1"
        ))
        .bind(subdomain)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_by_custom_domain(&self, domain: &str) -> AppResult<Option<TenantRecord>> {
        let row = sqlx::query_as::<_, TenantRecord>(&format!(
            "SELECT {TENANT_COLUMNS} FROM organizations WHERE custom_domain = $1"
        ))
        .bind(domain)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, organization_id: Uuid) -> AppResult<Option<TenantRecord>> {
        let row = sqlx::query_as::<_, TenantRecord>(&format!(
            "SELECT {TENANT_COLUMNS} FROM organizations WHERE id = $1"
        ))
        .bind(organization_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn create_organization(&self, new: NewOrganization) -> AppResult<Option<Organization>> {
        let mut tx = self.db.begin().await?;

        let org: Option<Organization> = sqlx::query_as(
            r#"INSERT INTO organizations (id, name, subdomain, primary_color, secondary_color, tagline)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (subdomain) DO NOTHING
            RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.subdomain)
        .bind(&new.primary_color)
        .bind(&new.secondary_color)
        .bind(&new.tagline)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(org) = org else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO organization_roles (organization_id, user_id, email, role) VALUES ($1, $2, $3, 'admin')",
        )
        .bind(org.id)
        .bind(new.owner_id)
        .bind(&new.owner_email)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(org))
    }

    async fn claim_custom_domain(
        &self,
        organization_id: Uuid,
        domain: &str,
        token: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"UPDATE organizations
            SET custom_domain = $2, domain_verification_token = $3,
                domain_verified = false, domain_verified_at = NULL, updated_at = NOW()
            WHERE id = $1"#,
        )
        .bind(organization_id)
        .bind(domain)
        .bind(token)
        .execute(&self.db)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(e, "Domain is already in use by another organization")
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Organization not found".into()));
        }
        Ok(())
    }

    async fn mark_domain_verified(
        &self,
        organization_id: Uuid,
        domain: &str,
        token: Option<&str>,
        verified_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE organizations
            SET domain_verified = true, domain_verified_at = $4, updated_at = NOW()
            WHERE id = $1 AND custom_domain = $2 AND domain_verification_token IS NOT DISTINCT FROM $3"#,
        )
        .bind(organization_id)
        .bind(domain)
        .bind(token)
        .bind(verified_at)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_custom_domain(&self, organization_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"UPDATE organizations
            SET custom_domain = NULL, domain_verification_token = NULL,
                domain_verified = false, domain_verified_at = NULL, updated_at = NOW()
            WHERE id = $1"#,
        )
        .bind(organization_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use std::sync::Mutex;

    /// In-process store for routing and workflow tests.
    #[derive(Default)]
    pub struct MemoryTenantStore {
        orgs: Mutex<Vec<Organization>>,
        tokens: Mutex<Vec<(Uuid, String)>>,
        pub fail_reads: bool,
    }

    impl MemoryTenantStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail_reads: true,
                ..Self::default()
            }
        }

        pub fn insert(&self, subdomain: &str) -> Uuid {
            let now = Utc::now();
            let id = Uuid::new_v4();
            self.orgs.lock().unwrap().push(Organization {
                id,
                name: subdomain.to_uppercase(),
                subdomain: subdomain.to_string(),
                custom_domain: None,
                domain_verified: false,
                domain_verified_at: None,
                primary_color: None,
                secondary_color: None,
                logo_url: None,
                tagline: None,
                plan: "free".to_string(),
                subscription_status: None,
                stripe_customer_id: None,
                created_at: now,
                updated_at: now,
            });
            id
        }

        pub fn insert_with_domain(&self, subdomain: &str, domain: &str, verified: bool) -> Uuid {
            let id = self.insert(subdomain);
            let mut orgs = self.orgs.lock().unwrap();
            let org = orgs.iter_mut().find(|o| o.id == id).unwrap();
            org.custom_domain = Some(domain.to_string());
            org.domain_verified = verified;
            id
        }

        fn record(&self, org: &Organization) -> TenantRecord {
            let token = self
                .tokens
                .lock()
                .unwrap()
                .iter()
                .find(|(id, _)| *id == org.id)
                .map(|(_, t)| t.clone());
            TenantRecord {
                id: org.id,
                subdomain: org.subdomain.clone(),
                custom_domain: org.custom_domain.clone(),
                domain_verified: org.domain_verified,
                domain_verification_token: token,
                domain_verified_at: org.domain_verified_at,
            }
        }

        fn find(&self, pred: impl Fn(&Organization) -> bool) -> AppResult<Option<TenantRecord>> {
            if self.fail_reads {
                return Err(AppError::Database(sqlx::Error::PoolTimedOut));
            }
            let orgs = self.orgs.lock().unwrap();
            Ok(orgs.iter().find(|o| pred(o)).map(|o| self.record(o)))
        }
    }

    #[async_trait]
    impl TenantStore for MemoryTenantStore {
        async fn find_by_subdomain(&self, subdomain: &str) -> AppResult<Option<TenantRecord>> {
            self.find(|o| o.subdomain == subdomain)
        }

        async fn find_by_custom_domain(&self, domain: &str) -> AppResult<Option<TenantRecord>> {
            self.find(|o| o.custom_domain.as_deref() == Some(domain))
        }

        async fn find_by_id(&self, organization_id: Uuid) -> AppResult<Option<TenantRecord>> {
            self.find(|o| o.id == organization_id)
        }

        async fn create_organization(
            &self,
            new: NewOrganization,
        ) -> AppResult<Option<Organization>> {
            if self
                .orgs
                .lock()
                .unwrap()
                .iter()
                .any(|o| o.subdomain == new.subdomain)
            {
                return Ok(None);
            }
            let id = self.insert(&new.subdomain);
            let mut orgs = self.orgs.lock().unwrap();
            let org = orgs.iter_mut().find(|o| o.id == id).unwrap();
            org.name = new.name;
            org.primary_color = new.primary_color;
            org.secondary_color = new.secondary_color;
            org.tagline = new.tagline;
            Ok(Some(org.clone()))
        }

        async fn claim_custom_domain(
            &self,
            organization_id: Uuid,
            domain: &str,
            token: &str,
        ) -> AppResult<()> {
            let mut orgs = self.orgs.lock().unwrap();
            if orgs
                .iter()
                .any(|o| o.id != organization_id && o.custom_domain.as_deref() == Some(domain))
            {
                return Err(AppError::Conflict(
                    "Domain is already in use by another organization".into(),
                ));
            }
            let org = orgs
                .iter_mut()
                .find(|o| o.id == organization_id)
                .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;
            org.custom_domain = Some(domain.to_string());
            org.domain_verified = false;
            org.domain_verified_at = None;

            let mut tokens = self.tokens.lock().unwrap();
            tokens.retain(|(id, _)| *id != organization_id);
            tokens.push((organization_id, token.to_string()));
            Ok(())
        }

        async fn mark_domain_verified(
            &self,
            organization_id: Uuid,
            domain: &str,
            token: Option<&str>,
            verified_at: DateTime<Utc>,
        ) -> AppResult<bool> {
            let stored = self
                .tokens
                .lock()
                .unwrap()
                .iter()
                .find(|(id, _)| *id == organization_id)
                .map(|(_, t)| t.clone());
            let token_matches = stored.as_deref() == token;
            let mut orgs = self.orgs.lock().unwrap();
            match orgs.iter_mut().find(|o| o.id == organization_id) {
                Some(org) if token_matches && org.custom_domain.as_deref() == Some(domain) => {
                    org.domain_verified = true;
                    org.domain_verified_at = Some(verified_at);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn clear_custom_domain(&self, organization_id: Uuid) -> AppResult<()> {
            let mut orgs = self.orgs.lock().unwrap();
            if let Some(org) = orgs.iter_mut().find(|o| o.id == organization_id) {
                org.custom_domain = None;
                org.domain_verified = false;
                org.domain_verified_at = None;
            }
            self.tokens
                .lock()
                .unwrap()
                .retain(|(id, _)| *id != organization_id);
            Ok(())
        }
    }
}
