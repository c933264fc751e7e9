use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::membership::OrgAccess;
use crate::models::organization::Role;
use crate::AppState;

/// Signed parameters for a direct browser upload into the
/// organization's folder.
pub async fn signature(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    access.require(Role::Coach)?;
    let signer = state
        .cloudinary
        .as_ref()
        .ok_or(AppError::NotConfigured("Image uploads"))?;

    let folder = format!(
        "{}/{}",
        state.config.routing.product_slug, access.organization_id
    );
    let signed = signer.sign(&folder, chrono::Utc::now().timestamp());
    Ok(Json(json!({ "upload": signed })))
}
