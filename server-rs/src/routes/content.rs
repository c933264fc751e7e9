use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::membership::OrgAccess;
use crate::models::content::*;
use crate::models::organization::Role;
use crate::routes::roster::required;
use crate::AppState;

const SLUG_TAKEN: &str = "A post with this slug already exists";

/// Explicit slug if given, otherwise derived from the title.
fn resolve_slug(explicit: Option<&str>, title: &str) -> AppResult<String> {
    let slug = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.to_ascii_lowercase(),
        None => slugify(title),
    };
    if !is_valid_slug(&slug) {
        return Err(AppError::BadRequest(
            "Slug may only contain lowercase letters, numbers and hyphens".into(),
        ));
    }
    Ok(slug)
}

fn check_tier(tier: &str) -> AppResult<()> {
    if !is_valid_tier(tier) {
        return Err(AppError::BadRequest(format!(
            "Tier must be one of: {}",
            SPONSOR_TIERS.join(", ")
        )));
    }
    Ok(())
}

// --- Blog posts ---

pub async fn list_posts(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    let posts: Vec<Post> = sqlx::query_as(
        "SELECT * FROM posts WHERE organization_id = $1 ORDER BY created_at DESC",
    )
    .bind(access.organization_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "posts": posts })))
}

pub async fn create_post(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    access.require(Role::Coach)?;
    let title = required(&body.title, "Title")?;
    let slug = resolve_slug(body.slug.as_deref(), &title)?;
    let published = body.published.unwrap_or(false);

    let post: Post = sqlx::query_as(
        r#"INSERT INTO posts (id, organization_id, author_id, title, slug, content, published, published_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $7 THEN NOW() END)
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(access.organization_id)
    .bind(access.user_id)
    .bind(&title)
    .bind(&slug)
    .bind(body.content.as_deref().unwrap_or_default())
    .bind(published)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, SLUG_TAKEN))?;

    Ok((StatusCode::CREATED, Json(json!({ "post": post }))))
}

pub async fn update_post(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, post_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdatePostRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Coach)?;
    let title = body.title.as_deref().map(|t| required(t, "Title")).transpose()?;
    let slug = match body.slug.as_deref() {
        Some(s) => Some(resolve_slug(Some(s), title.as_deref().unwrap_or_default())?),
        None => None,
    };

    // published_at is stamped on the first publish only.
    let post: Post = sqlx::query_as(
        r#"UPDATE posts SET
            title = COALESCE($3, title),
            slug = COALESCE($4, slug),
            content = COALESCE($5, content),
            published = COALESCE($6, published),
            published_at = CASE
                WHEN COALESCE($6, published) AND published_at IS NULL THEN NOW()
                ELSE published_at
            END,
            updated_at = NOW()
        WHERE id = $1 AND organization_id = $2
        RETURNING *"#,
    )
    .bind(post_id)
    .bind(access.organization_id)
    .bind(title)
    .bind(slug)
    .bind(&body.content)
    .bind(body.published)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, SLUG_TAKEN))?
    .ok_or_else(|| AppError::NotFound("Post not found".into()))?;

    Ok(Json(json!({ "post": post })))
}

pub async fn delete_post(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, post_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    access.require(Role::Coach)?;
    let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND organization_id = $2")
        .bind(post_id)
        .bind(access.organization_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Post not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Sponsors ---

pub async fn list_sponsors(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    let sponsors: Vec<Sponsor> = sqlx::query_as(
        "SELECT * FROM sponsors WHERE organization_id = $1 ORDER BY sort_order, name",
    )
    .bind(access.organization_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "sponsors": sponsors })))
}

pub async fn create_sponsor(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<CreateSponsorRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    access.require(Role::Coach)?;
    let name = required(&body.name, "Sponsor name")?;
    let tier = body.tier.unwrap_or_else(|| "community".to_string());
    check_tier(&tier)?;

    let sponsor: Sponsor = sqlx::query_as(
        r#"INSERT INTO sponsors (id, organization_id, name, website_url, logo_url, tier, sort_order)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(access.organization_id)
    .bind(&name)
    .bind(&body.website_url)
    .bind(&body.logo_url)
    .bind(&tier)
    .bind(body.sort_order.unwrap_or(0))
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "sponsor": sponsor }))))
}

pub async fn update_sponsor(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, sponsor_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateSponsorRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Coach)?;
    let name = body.name.as_deref().map(|n| required(n, "Sponsor name")).transpose()?;
    if let Some(tier) = &body.tier {
        check_tier(tier)?;
    }

    let sponsor: Sponsor = sqlx::query_as(
        r#"UPDATE sponsors SET
            name = COALESCE($3, name),
            website_url = COALESCE($4, website_url),
            logo_url = COALESCE($5, logo_url),
            tier = COALESCE($6, tier),
            sort_order = COALESCE($7, sort_order),
            updated_at = NOW()
        WHERE id = $1 AND organization_id = $2
        RETURNING *"#,
    )
    .bind(sponsor_id)
    .bind(access.organization_id)
    .bind(name)
    .bind(&body.website_url)
    .bind(&body.logo_url)
    .bind(&body.tier)
    .bind(body.sort_order)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Sponsor not found".into()))?;

    Ok(Json(json!({ "sponsor": sponsor })))
}

pub async fn delete_sponsor(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, sponsor_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    access.require(Role::Coach)?;
    let result = sqlx::query("DELETE FROM sponsors WHERE id = $1 AND organization_id = $2")
        .bind(sponsor_id)
        .bind(access.organization_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Sponsor not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}
