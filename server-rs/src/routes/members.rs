use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::SessionContext;
use crate::middleware::membership::OrgAccess;
use crate::models::organization::{
    CreateInvitationRequest, Invitation, OrganizationMember, Role, UpdateMemberRequest,
};
use crate::outcome::{Outcome, SideEffect};
use crate::services::email::invitation_email;
use crate::AppState;

const INVITATION_TTL_DAYS: i64 = 7;

fn invitation_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// True when the change would leave the organization without an admin.
/// `new_role = None` means the member is being removed.
fn orphans_organization(current: Role, new_role: Option<Role>, admin_count: usize) -> bool {
    current == Role::Admin && new_role != Some(Role::Admin) && admin_count <= 1
}

fn check_invitation(invitation: &Invitation, now: DateTime<Utc>) -> AppResult<()> {
    if invitation.accepted_at.is_some() {
        return Err(AppError::BadRequest("This invitation has already been accepted".into()));
    }
    if invitation.expires_at <= now {
        return Err(AppError::BadRequest("This invitation has expired".into()));
    }
    Ok(())
}

fn parse_role(value: &str) -> AppResult<Role> {
    Role::parse(value.trim())
        .ok_or_else(|| AppError::BadRequest("Role must be admin, coach or member".into()))
}

pub async fn list_members(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    let members: Vec<OrganizationMember> = sqlx::query_as(
        "SELECT user_id, email, role, created_at FROM organization_roles WHERE organization_id = $1 ORDER BY created_at",
    )
    .bind(access.organization_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "members": members })))
}

/// Locks the organization's admin rows and returns the member's current role.
async fn lock_roles(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    organization_id: Uuid,
    user_id: Uuid,
) -> AppResult<(Role, usize)> {
    let admins: Vec<Uuid> = sqlx::query_scalar(
        "SELECT user_id FROM organization_roles WHERE organization_id = $1 AND role = 'admin' FOR UPDATE",
    )
    .bind(organization_id)
    .fetch_all(&mut **tx)
    .await?;

    let current: Option<String> = sqlx::query_scalar(
        "SELECT role FROM organization_roles WHERE organization_id = $1 AND user_id = $2",
    )
    .bind(organization_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    let current = current
        .and_then(|r| Role::parse(&r))
        .ok_or_else(|| AppError::NotFound("Member not found".into()))?;
    Ok((current, admins.len()))
}

pub async fn update_member(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, user_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateMemberRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;
    let role = parse_role(&body.role)?;

    let mut tx = state.db.begin().await?;
    let (current, admin_count) = lock_roles(&mut tx, access.organization_id, user_id).await?;
    if orphans_organization(current, Some(role), admin_count) {
        return Err(AppError::Conflict("An organization needs at least one admin".into()));
    }

    let member: OrganizationMember = sqlx::query_as(
        r#"UPDATE organization_roles SET role = $3
        WHERE organization_id = $1 AND user_id = $2
        RETURNING user_id, email, role, created_at"#,
    )
    .bind(access.organization_id)
    .bind(user_id)
    .bind(role.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(organization_id = %access.organization_id, %user_id, role = role.as_str(), "Member role changed");
    Ok(Json(json!({ "member": member })))
}

pub async fn remove_member(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    access.require(Role::Admin)?;

    let mut tx = state.db.begin().await?;
    let (current, admin_count) = lock_roles(&mut tx, access.organization_id, user_id).await?;
    if orphans_organization(current, None, admin_count) {
        return Err(AppError::Conflict("An organization needs at least one admin".into()));
    }

    sqlx::query("DELETE FROM organization_roles WHERE organization_id = $1 AND user_id = $2")
        .bind(access.organization_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(organization_id = %access.organization_id, %user_id, "Member removed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_invitations(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    access.require(Role::Admin)?;

    let invitations: Vec<Invitation> = sqlx::query_as(
        r#"SELECT * FROM invitations
        WHERE organization_id = $1 AND accepted_at IS NULL AND expires_at > NOW()
        ORDER BY created_at DESC"#,
    )
    .bind(access.organization_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "invitations": invitations })))
}

pub async fn create_invitation(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<CreateInvitationRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    access.require(Role::Admin)?;

    let email = body.email.trim().to_ascii_lowercase();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(AppError::BadRequest("A valid email address is required".into()));
    }
    let role = match body.role.as_deref() {
        Some(r) => parse_role(r)?,
        None => Role::Member,
    };

    let invitation: Invitation = sqlx::query_as(
        r#"INSERT INTO invitations (id, organization_id, email, role, token, invited_by, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(access.organization_id)
    .bind(&email)
    .bind(role.as_str())
    .bind(invitation_token())
    .bind(access.user_id)
    .bind(Utc::now() + Duration::days(INVITATION_TTL_DAYS))
    .fetch_one(&state.db)
    .await?;

    let accept_url = format!("{}invite/{}", state.config.root_url(), invitation.token);
    let mut outcome = Outcome::new(invitation);

    let sent = match &state.email {
        Some(client) => {
            let org_name: String =
                sqlx::query_scalar("SELECT name FROM organizations WHERE id = $1")
                    .bind(access.organization_id)
                    .fetch_one(&state.db)
                    .await?;
            let (subject, html) = invitation_email(&org_name, role.as_str(), &accept_url);
            Some(client.send(&email, &subject, &html).await)
        }
        None => None,
    };
    outcome.record_optional(SideEffect::InvitationEmail, sent);

    tracing::info!(organization_id = %access.organization_id, role = role.as_str(), "Invitation created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "invitation": outcome.value,
            "inviteUrl": accept_url,
            "warnings": outcome.warnings(),
        })),
    ))
}

pub async fn revoke_invitation(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, invitation_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    access.require(Role::Admin)?;

    let result = sqlx::query(
        "DELETE FROM invitations WHERE id = $1 AND organization_id = $2 AND accepted_at IS NULL",
    )
    .bind(invitation_id)
    .bind(access.organization_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Invitation not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn show_invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<Value>> {
    let row: Option<(String, String, String, DateTime<Utc>, Option<DateTime<Utc>>)> =
        sqlx::query_as(
            r#"SELECT o.name, o.subdomain, i.role, i.expires_at, i.accepted_at
            FROM invitations i
            JOIN organizations o ON o.id = i.organization_id
            WHERE i.token = $1"#,
        )
        .bind(&token)
        .fetch_optional(&state.db)
        .await?;

    let (org_name, subdomain, role, expires_at, accepted_at) =
        row.ok_or_else(|| AppError::NotFound("Invitation not found".into()))?;

    Ok(Json(json!({
        "organizationName": org_name,
        "subdomain": subdomain,
        "role": role,
        "expiresAt": expires_at,
        "accepted": accepted_at.is_some(),
        "expired": expires_at <= Utc::now(),
    })))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    session: axum::Extension<SessionContext>,
    Path(token): Path<String>,
) -> AppResult<Json<Value>> {
    let user = session.user();
    let mut tx = state.db.begin().await?;

    let invitation: Invitation =
        sqlx::query_as("SELECT * FROM invitations WHERE token = $1 FOR UPDATE")
            .bind(&token)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Invitation not found".into()))?;
    check_invitation(&invitation, Utc::now())?;

    // An existing membership keeps its role.
    sqlx::query(
        r#"INSERT INTO organization_roles (organization_id, user_id, email, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (organization_id, user_id) DO NOTHING"#,
    )
    .bind(invitation.organization_id)
    .bind(user.id)
    .bind(user.email.as_deref().unwrap_or(&invitation.email))
    .bind(&invitation.role)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE invitations SET accepted_at = NOW() WHERE id = $1")
        .bind(invitation.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(organization_id = %invitation.organization_id, user_id = %user.id, "Invitation accepted");
    Ok(Json(json!({
        "organizationId": invitation.organization_id,
        "role": invitation.role,
    })))
}
