use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::SessionContext;
use crate::middleware::membership::OrgAccess;
use crate::models::organization::{is_valid_color, Organization, Role, UpdateOrganizationRequest};
use crate::AppState;

pub async fn list_mine(
    State(state): State<AppState>,
    session: axum::Extension<SessionContext>,
) -> AppResult<Json<Value>> {
    let memberships = session.memberships(&state.db).await?;
    Ok(Json(json!({ "organizations": memberships })))
}

pub async fn get_org(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    let org: Organization = sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
        .bind(access.organization_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;

    let member_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::bigint FROM organization_roles WHERE organization_id = $1",
    )
    .bind(access.organization_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "organization": org,
        "siteUrl": state.config.routing.site_url(&org.subdomain),
        "memberCount": member_count,
        "role": access.role,
    })))
}

pub async fn update_org(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<UpdateOrganizationRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;

    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("Organization name cannot be empty".into()));
        }
    }
    for (field, value) in [
        ("primaryColor", &body.primary_color),
        ("secondaryColor", &body.secondary_color),
    ] {
        if let Some(color) = value {
            if !is_valid_color(color) {
                return Err(AppError::BadRequest(format!(
                    "{field} must be a hex color like #1e40af"
                )));
            }
        }
    }

    let org: Organization = sqlx::query_as(
        r#"UPDATE organizations SET
            name = COALESCE($2, name),
            primary_color = COALESCE($3, primary_color),
            secondary_color = COALESCE($4, secondary_color),
            logo_url = COALESCE($5, logo_url),
            tagline = COALESCE($6, tagline),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *"#,
    )
    .bind(access.organization_id)
    .bind(body.name.as_deref().map(str::trim))
    .bind(&body.primary_color)
    .bind(&body.secondary_color)
    .bind(&body.logo_url)
    .bind(&body.tagline)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(organization_id = %org.id, "Organization branding updated");
    Ok(Json(json!({ "organization": org })))
}
