use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::SessionContext;
use crate::models::organization::Role;
use crate::AppState;

/// The caller's role in the organization named by `:org_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgAccess {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

impl OrgAccess {
    pub fn require(&self, min_role: Role) -> AppResult<()> {
        if self.role < min_role {
            return Err(AppError::Forbidden(format!(
                "Requires {} role or higher",
                min_role.as_str()
            )));
        }
        Ok(())
    }
}

/// Route layer for `/dashboard/:org_id/...`: rejects callers with no role
/// in the organization and inserts `OrgAccess` for the handlers.
pub async fn require_member(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = req
        .extensions()
        .get::<SessionContext>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    let organization_id = params
        .get("org_id")
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;

    let role = session
        .role_in(&state.db, organization_id)
        .await?
        .ok_or_else(|| AppError::Forbidden("You are not a member of this organization".into()))?;

    req.extensions_mut().insert(OrgAccess {
        organization_id,
        user_id: session.user().id,
        role,
    });
    Ok(next.run(req).await)
}
