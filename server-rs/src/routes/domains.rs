use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::membership::OrgAccess;
use crate::models::organization::{AddDomainRequest, Role};
use crate::outcome::Outcome;
use crate::services::domains::{DomainStatus, DomainWorkflow};
use crate::AppState;

fn domain_json(outcome: Outcome<DomainStatus>) -> Json<Value> {
    Json(json!({
        "domain": outcome.value,
        "warnings": outcome.warnings(),
    }))
}

pub async fn status(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;
    let status = DomainWorkflow::from_state(&state)
        .status(access.organization_id)
        .await?;
    Ok(domain_json(Outcome::new(status)))
}

pub async fn add(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<AddDomainRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;
    let outcome = DomainWorkflow::from_state(&state)
        .add(access.organization_id, &body.domain)
        .await?;
    Ok(domain_json(outcome))
}

pub async fn verify(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;
    let outcome = DomainWorkflow::from_state(&state)
        .verify(access.organization_id)
        .await?;
    Ok(domain_json(outcome))
}

pub async fn remove(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;
    let outcome = DomainWorkflow::from_state(&state)
        .remove(access.organization_id)
        .await?;
    Ok(domain_json(outcome))
}
