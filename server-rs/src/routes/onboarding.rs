use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::SessionContext;
use crate::models::organization::{
    is_valid_color, CreateOrganizationRequest, NewOrganization, Organization, SubdomainQuery,
};
use crate::outcome::{Outcome, SideEffect};
use crate::routes::billing::ensure_customer;
use crate::services::email::welcome_email;
use crate::services::subdomain::validate_subdomain;
use crate::AppState;

pub async fn check_subdomain(
    State(state): State<AppState>,
    Query(query): Query<SubdomainQuery>,
) -> AppResult<Json<Value>> {
    let subdomain = match validate_subdomain(&query.name, &state.config.routing.product_slug) {
        Ok(s) => s,
        Err(e) => {
            return Ok(Json(json!({
                "available": false,
                "reason": e.to_string(),
            })))
        }
    };

    // Advisory only; creation relies on the unique constraint.
    let taken = state.tenants.find_by_subdomain(&subdomain).await?.is_some();
    let reason = taken.then_some("Subdomain is already taken");
    Ok(Json(json!({
        "subdomain": subdomain,
        "available": !taken,
        "reason": reason,
    })))
}

fn optional_color(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(color) if !is_valid_color(&color) => Err(AppError::BadRequest(format!(
            "{field} must be a hex color like #1e40af"
        ))),
        other => Ok(other),
    }
}

pub async fn create_organization(
    State(state): State<AppState>,
    session: axum::Extension<SessionContext>,
    Json(body): Json<CreateOrganizationRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Organization name required".into()));
    }
    let subdomain = validate_subdomain(&body.subdomain, &state.config.routing.product_slug)?;
    let user = session.user();

    let new = NewOrganization {
        name,
        subdomain,
        primary_color: optional_color(body.primary_color, "primaryColor")?,
        secondary_color: optional_color(body.secondary_color, "secondaryColor")?,
        tagline: body.tagline.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        owner_id: user.id,
        owner_email: user.email.clone(),
    };

    let org = state
        .tenants
        .create_organization(new)
        .await?
        .ok_or_else(|| AppError::Conflict("Subdomain is already taken".into()))?;
    tracing::info!(organization_id = %org.id, subdomain = org.subdomain, "Organization created");

    let outcome = run_onboarding_side_effects(&state, org, user.email.as_deref()).await;
    let site_url = state.config.routing.site_url(&outcome.value.subdomain);
    if !outcome.is_clean() {
        tracing::info!(organization_id = %outcome.value.id, "Onboarding finished with warnings");
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "organization": outcome.value,
            "siteUrl": site_url,
            "warnings": outcome.warnings(),
        })),
    ))
}

async fn run_onboarding_side_effects(
    state: &AppState,
    org: Organization,
    owner_email: Option<&str>,
) -> Outcome<Organization> {
    let mut outcome = Outcome::new(org);
    let org = &outcome.value;

    let billing = match &state.stripe {
        Some(stripe) => Some(ensure_customer(state, stripe, org.id, owner_email).await),
        None => None,
    };

    let welcome = match (&state.email, owner_email) {
        (Some(email), Some(to)) => {
            let (subject, html) = welcome_email(&org.name, &state.config.routing.site_url(&org.subdomain));
            Some(email.send(to, &subject, &html).await)
        }
        _ => None,
    };

    outcome.record_optional(SideEffect::BillingCustomer, billing);
    outcome.record_optional(SideEffect::WelcomeEmail, welcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dns::fake::StaticResolver;
    use crate::store::memory::MemoryTenantStore;
    use crate::test_support;

    #[test]
    fn colors_are_validated_when_present() {
        assert_eq!(optional_color(None, "c").unwrap(), None);
        assert_eq!(optional_color(Some("  ".into()), "c").unwrap(), None);
        assert_eq!(
            optional_color(Some("#1E40AF".into()), "c").unwrap().as_deref(),
            Some("#1E40AF")
        );
        assert!(optional_color(Some("blue".into()), "c").is_err());
    }

    #[tokio::test]
    async fn subdomain_availability() {
        let store = MemoryTenantStore::new();
        store.insert("eagles");
        let state = test_support::state(store, StaticResolver::new(), false);

        let check = |name: &str| {
            let state = state.clone();
            let name = name.to_string();
            async move {
                check_subdomain(State(state), Query(SubdomainQuery { name }))
                    .await
                    .unwrap()
                    .0
            }
        };

        let body = check("Eagles").await;
        assert_eq!(body["available"], false);
        assert_eq!(body["subdomain"], "eagles");

        let body = check("hawks").await;
        assert_eq!(body["available"], true);

        let body = check("www").await;
        assert_eq!(body["available"], false);
        assert_eq!(body["reason"], "Subdomain is reserved");

        let body = check("ab").await;
        assert_eq!(body["available"], false);
    }

    #[tokio::test]
    async fn onboarding_without_integrations_has_no_warnings() {
        let store = MemoryTenantStore::new();
        let state = test_support::state(store, StaticResolver::new(), false);
        let org = state
            .tenants
            .create_organization(NewOrganization {
                name: "Eagles".into(),
                subdomain: "eagles".into(),
                primary_color: None,
                secondary_color: None,
                tagline: None,
                owner_id: uuid::Uuid::new_v4(),
                owner_email: Some("owner@example.com".into()),
            })
            .await
            .unwrap()
            .unwrap();

        let outcome = run_onboarding_side_effects(&state, org, Some("owner@example.com")).await;
        assert!(outcome.is_clean());
        assert_eq!(outcome.value.subdomain, "eagles");
    }
}
