use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::SessionContext;
use crate::AppState;

pub async fn me(
    State(state): State<AppState>,
    session: axum::Extension<SessionContext>,
) -> AppResult<Json<Value>> {
    let memberships = session.memberships(&state.db).await?;
    Ok(Json(json!({
        "user": session.user(),
        "organizations": memberships,
    })))
}
