use axum::{extract::State, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::membership::OrgAccess;
use crate::models::organization::{CheckoutRequest, Role};
use crate::services::stripe_service::StripeClient;
use crate::AppState;

fn billing_client(state: &AppState) -> AppResult<&StripeClient> {
    state.stripe.as_ref().ok_or(AppError::NotConfigured("Billing"))
}

/// Returns the organization's Stripe customer, creating it on first use.
pub async fn ensure_customer(
    state: &AppState,
    stripe: &StripeClient,
    organization_id: Uuid,
    email: Option<&str>,
) -> AppResult<String> {
    let (name, existing): (String, Option<String>) = sqlx::query_as(
        "SELECT name, stripe_customer_id FROM organizations WHERE id = $1",
    )
    .bind(organization_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;

    if let Some(cid) = existing.filter(|c| !c.is_empty()) {
        return Ok(cid);
    }

    let customer = stripe
        .create_customer(email.unwrap_or_default(), &name, &organization_id.to_string())
        .await?;
    let cid = customer["id"]
        .as_str()
        .ok_or_else(|| AppError::Internal("Stripe customer has no id".into()))?
        .to_string();

    sqlx::query("UPDATE organizations SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2")
        .bind(&cid)
        .bind(organization_id)
        .execute(&state.db)
        .await?;
    tracing::info!(%organization_id, "Stripe customer created");
    Ok(cid)
}

pub async fn summary(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;

    let (plan, status, customer): (String, Option<String>, Option<String>) = sqlx::query_as(
        "SELECT plan, subscription_status, stripe_customer_id FROM organizations WHERE id = $1",
    )
    .bind(access.organization_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "configured": state.stripe.is_some(),
        "plan": plan,
        "subscriptionStatus": status,
        "hasBillingAccount": customer.is_some_and(|c| !c.is_empty()),
    })))
}

pub async fn checkout(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    session: axum::Extension<crate::middleware::auth::SessionContext>,
    Json(body): Json<CheckoutRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;
    let stripe = billing_client(&state)?;

    let plan = body.plan.trim().to_ascii_lowercase();
    let price_id = stripe
        .price_for_plan(&plan)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown plan '{plan}'")))?
        .to_string();

    let customer_id = ensure_customer(
        &state,
        stripe,
        access.organization_id,
        session.user().email.as_deref(),
    )
    .await?;

    let billing_url = format!(
        "{}dashboard/{}/billing",
        state.config.root_url(),
        access.organization_id
    );
    let checkout = stripe
        .create_checkout_session(
            &customer_id,
            &price_id,
            &access.organization_id.to_string(),
            &format!("{billing_url}?checkout=success"),
            &format!("{billing_url}?checkout=cancelled"),
        )
        .await?;

    tracing::info!(organization_id = %access.organization_id, plan, "Checkout session created");
    Ok(Json(json!({ "url": checkout["url"] })))
}

pub async fn portal(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;
    let stripe = billing_client(&state)?;

    let cid: Option<String> = sqlx::query_scalar(
        "SELECT stripe_customer_id FROM organizations WHERE id = $1",
    )
    .bind(access.organization_id)
    .fetch_optional(&state.db)
    .await?
    .flatten();

    let cid = cid
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("No billing account yet; start a subscription first".into()))?;
    let return_url = format!(
        "{}dashboard/{}/billing",
        state.config.root_url(),
        access.organization_id
    );
    let session = stripe.create_billing_portal(&cid, &return_url).await?;

    Ok(Json(json!({ "url": session["url"] })))
}
