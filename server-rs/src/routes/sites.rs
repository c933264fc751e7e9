use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::content::{Post, Sponsor};
use crate::models::organization::Organization;
use crate::models::roster::{Coach, Player, Team};
use crate::models::schedule::{Game, ScheduleEvent};
use crate::AppState;

async fn site_org(db: &PgPool, subdomain: &str) -> AppResult<Organization> {
    sqlx::query_as("SELECT * FROM organizations WHERE subdomain = $1")
        .bind(subdomain.to_ascii_lowercase())
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Site not found".into()))
}

/// The branding a public site may show; billing and domain state stay private.
fn public_profile(org: &Organization) -> Value {
    json!({
        "name": org.name,
        "subdomain": org.subdomain,
        "tagline": org.tagline,
        "logoUrl": org.logo_url,
        "primaryColor": org.primary_color,
        "secondaryColor": org.secondary_color,
    })
}

pub async fn home(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> AppResult<Json<Value>> {
    let org = site_org(&state.db, &subdomain).await?;

    let (teams, upcoming, recent_posts) = tokio::try_join!(
        sqlx::query_as::<_, Team>("SELECT * FROM teams WHERE organization_id = $1 ORDER BY name")
            .bind(org.id)
            .fetch_all(&state.db),
        sqlx::query_as::<_, ScheduleEvent>(
            "SELECT * FROM schedule_events WHERE organization_id = $1 AND starts_at >= NOW() ORDER BY starts_at LIMIT 5",
        )
        .bind(org.id)
        .fetch_all(&state.db),
        sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE organization_id = $1 AND published ORDER BY published_at DESC LIMIT 3",
        )
        .bind(org.id)
        .fetch_all(&state.db),
    )?;

    Ok(Json(json!({
        "site": public_profile(&org),
        "teams": teams,
        "upcoming": upcoming,
        "posts": recent_posts,
    })))
}

pub async fn teams(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> AppResult<Json<Value>> {
    let org = site_org(&state.db, &subdomain).await?;
    let teams: Vec<Team> =
        sqlx::query_as("SELECT * FROM teams WHERE organization_id = $1 ORDER BY name")
            .bind(org.id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(json!({ "site": public_profile(&org), "teams": teams })))
}

pub async fn team(
    State(state): State<AppState>,
    Path((subdomain, team_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    let org = site_org(&state.db, &subdomain).await?;
    let team: Team = sqlx::query_as("SELECT * FROM teams WHERE id = $1 AND organization_id = $2")
        .bind(team_id)
        .bind(org.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Team not found".into()))?;

    let players: Vec<Player> = sqlx::query_as(
        "SELECT * FROM players WHERE team_id = $1 ORDER BY jersey_number NULLS LAST, last_name",
    )
    .bind(team.id)
    .fetch_all(&state.db)
    .await?;
    let coaches: Vec<Coach> = sqlx::query_as("SELECT * FROM coaches WHERE team_id = $1 ORDER BY name")
        .bind(team.id)
        .fetch_all(&state.db)
        .await?;

    // Contact addresses are for the dashboard only.
    let coaches: Vec<Value> = coaches
        .iter()
        .map(|c| json!({ "id": c.id, "name": c.name, "title": c.title }))
        .collect();

    Ok(Json(json!({
        "site": public_profile(&org),
        "team": team,
        "players": players,
        "coaches": coaches,
    })))
}

pub async fn schedule(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> AppResult<Json<Value>> {
    let org = site_org(&state.db, &subdomain).await?;
    let events: Vec<ScheduleEvent> = sqlx::query_as(
        "SELECT * FROM schedule_events WHERE organization_id = $1 AND COALESCE(ends_at, starts_at) >= NOW() ORDER BY starts_at",
    )
    .bind(org.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "site": public_profile(&org), "events": events })))
}

pub async fn games(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> AppResult<Json<Value>> {
    let org = site_org(&state.db, &subdomain).await?;
    let games: Vec<Game> = sqlx::query_as(
        "SELECT * FROM games WHERE organization_id = $1 ORDER BY starts_at DESC LIMIT 50",
    )
    .bind(org.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "site": public_profile(&org), "games": games })))
}

pub async fn blog(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> AppResult<Json<Value>> {
    let org = site_org(&state.db, &subdomain).await?;
    let posts: Vec<Post> = sqlx::query_as(
        "SELECT * FROM posts WHERE organization_id = $1 AND published ORDER BY published_at DESC",
    )
    .bind(org.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "site": public_profile(&org), "posts": posts })))
}

pub async fn post(
    State(state): State<AppState>,
    Path((subdomain, slug)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let org = site_org(&state.db, &subdomain).await?;
    let post: Post = sqlx::query_as(
        "SELECT * FROM posts WHERE organization_id = $1 AND slug = $2 AND published",
    )
    .bind(org.id)
    .bind(&slug)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Post not found".into()))?;
    Ok(Json(json!({ "site": public_profile(&org), "post": post })))
}

pub async fn sponsors(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> AppResult<Json<Value>> {
    let org = site_org(&state.db, &subdomain).await?;
    let sponsors: Vec<Sponsor> = sqlx::query_as(
        "SELECT * FROM sponsors WHERE organization_id = $1 ORDER BY sort_order, name",
    )
    .bind(org.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "site": public_profile(&org), "sponsors": sponsors })))
}
