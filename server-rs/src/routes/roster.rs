use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::membership::OrgAccess;
use crate::models::organization::Role;
use crate::models::roster::*;
use crate::AppState;

pub fn required(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// `404` unless the team belongs to the organization.
pub async fn ensure_team(db: &PgPool, organization_id: Uuid, team_id: Uuid) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM teams WHERE id = $1 AND organization_id = $2)",
    )
    .bind(team_id)
    .bind(organization_id)
    .fetch_one(db)
    .await?;

    if !exists {
        return Err(AppError::NotFound("Team not found".into()));
    }
    Ok(())
}

fn check_jersey(number: Option<i32>) -> AppResult<()> {
    match number {
        Some(n) if !is_valid_jersey_number(n) => Err(AppError::BadRequest(
            "Jersey number must be between 0 and 99".into(),
        )),
        _ => Ok(()),
    }
}

fn deleted(rows: u64, what: &str) -> AppResult<StatusCode> {
    if rows == 0 {
        return Err(AppError::NotFound(format!("{what} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Teams ---

pub async fn list_teams(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
) -> AppResult<Json<Value>> {
    let teams: Vec<Team> =
        sqlx::query_as("SELECT * FROM teams WHERE organization_id = $1 ORDER BY name")
            .bind(access.organization_id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(json!({ "teams": teams })))
}

pub async fn get_team(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, team_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    let team: Team = sqlx::query_as("SELECT * FROM teams WHERE id = $1 AND organization_id = $2")
        .bind(team_id)
        .bind(access.organization_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Team not found".into()))?;

    let players: Vec<Player> = sqlx::query_as(
        "SELECT * FROM players WHERE team_id = $1 AND organization_id = $2 ORDER BY jersey_number NULLS LAST, last_name",
    )
    .bind(team_id)
    .bind(access.organization_id)
    .fetch_all(&state.db)
    .await?;

    let coaches: Vec<Coach> = sqlx::query_as(
        "SELECT * FROM coaches WHERE team_id = $1 AND organization_id = $2 ORDER BY name",
    )
    .bind(team_id)
    .bind(access.organization_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "team": team, "players": players, "coaches": coaches })))
}

pub async fn create_team(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<CreateTeamRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    access.require(Role::Coach)?;
    let name = required(&body.name, "Team name")?;

    let team: Team = sqlx::query_as(
        r#"INSERT INTO teams (id, organization_id, name, season, age_group, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(access.organization_id)
    .bind(&name)
    .bind(&body.season)
    .bind(&body.age_group)
    .bind(&body.description)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "team": team }))))
}

pub async fn update_team(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, team_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateTeamRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Coach)?;
    let name = body.name.as_deref().map(|n| required(n, "Team name")).transpose()?;

    let team: Team = sqlx::query_as(
        r#"UPDATE teams SET
            name = COALESCE($3, name),
            season = COALESCE($4, season),
            age_group = COALESCE($5, age_group),
            description = COALESCE($6, description),
            updated_at = NOW()
        WHERE id = $1 AND organization_id = $2
        RETURNING *"#,
    )
    .bind(team_id)
    .bind(access.organization_id)
    .bind(name)
    .bind(&body.season)
    .bind(&body.age_group)
    .bind(&body.description)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Team not found".into()))?;

    Ok(Json(json!({ "team": team })))
}

pub async fn delete_team(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, team_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    access.require(Role::Coach)?;
    let result = sqlx::query("DELETE FROM teams WHERE id = $1 AND organization_id = $2")
        .bind(team_id)
        .bind(access.organization_id)
        .execute(&state.db)
        .await?;
    deleted(result.rows_affected(), "Team")
}

// --- Players ---

pub async fn list_players(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Query(filter): Query<TeamFilter>,
) -> AppResult<Json<Value>> {
    let players: Vec<Player> = sqlx::query_as(
        r#"SELECT * FROM players
        WHERE organization_id = $1 AND ($2::uuid IS NULL OR team_id = $2)
        ORDER BY last_name, first_name"#,
    )
    .bind(access.organization_id)
    .bind(filter.team_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "players": players })))
}

pub async fn create_player(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<CreatePlayerRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    access.require(Role::Coach)?;
    let first_name = required(&body.first_name, "First name")?;
    let last_name = required(&body.last_name, "Last name")?;
    check_jersey(body.jersey_number)?;
    ensure_team(&state.db, access.organization_id, body.team_id).await?;

    let player: Player = sqlx::query_as(
        r#"INSERT INTO players (id, organization_id, team_id, first_name, last_name, jersey_number, position)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(access.organization_id)
    .bind(body.team_id)
    .bind(&first_name)
    .bind(&last_name)
    .bind(body.jersey_number)
    .bind(&body.position)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "player": player }))))
}

pub async fn update_player(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, player_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdatePlayerRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Coach)?;
    check_jersey(body.jersey_number)?;
    let first_name = body.first_name.as_deref().map(|n| required(n, "First name")).transpose()?;
    let last_name = body.last_name.as_deref().map(|n| required(n, "Last name")).transpose()?;
    if let Some(team_id) = body.team_id {
        ensure_team(&state.db, access.organization_id, team_id).await?;
    }

    let player: Player = sqlx::query_as(
        r#"UPDATE players SET
            team_id = COALESCE($3, team_id),
            first_name = COALESCE($4, first_name),
            last_name = COALESCE($5, last_name),
            jersey_number = COALESCE($6, jersey_number),
            position = COALESCE($7, position),
            updated_at = NOW()
        WHERE id = $1 AND organization_id = $2
        RETURNING *"#,
    )
    .bind(player_id)
    .bind(access.organization_id)
    .bind(body.team_id)
    .bind(first_name)
    .bind(last_name)
    .bind(body.jersey_number)
    .bind(&body.position)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Player not found".into()))?;

    Ok(Json(json!({ "player": player })))
}

pub async fn delete_player(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, player_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    access.require(Role::Coach)?;
    let result = sqlx::query("DELETE FROM players WHERE id = $1 AND organization_id = $2")
        .bind(player_id)
        .bind(access.organization_id)
        .execute(&state.db)
        .await?;
    deleted(result.rows_affected(), "Player")
}

// --- Coaches ---

pub async fn list_coaches(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Query(filter): Query<TeamFilter>,
) -> AppResult<Json<Value>> {
    let coaches: Vec<Coach> = sqlx::query_as(
        r#"SELECT * FROM coaches
        WHERE organization_id = $1 AND ($2::uuid IS NULL OR team_id = $2)
        ORDER BY name"#,
    )
    .bind(access.organization_id)
    .bind(filter.team_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "coaches": coaches })))
}

pub async fn create_coach(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<CreateCoachRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    access.require(Role::Coach)?;
    let name = required(&body.name, "Coach name")?;
    ensure_team(&state.db, access.organization_id, body.team_id).await?;

    let coach: Coach = sqlx::query_as(
        r#"INSERT INTO coaches (id, organization_id, team_id, name, email, title)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(access.organization_id)
    .bind(body.team_id)
    .bind(&name)
    .bind(&body.email)
    .bind(&body.title)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "coach": coach }))))
}

pub async fn update_coach(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, coach_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateCoachRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Coach)?;
    let name = body.name.as_deref().map(|n| required(n, "Coach name")).transpose()?;
    if let Some(team_id) = body.team_id {
        ensure_team(&state.db, access.organization_id, team_id).await?;
    }

    let coach: Coach = sqlx::query_as(
        r#"UPDATE coaches SET
            team_id = COALESCE($3, team_id),
            name = COALESCE($4, name),
            email = COALESCE($5, email),
            title = COALESCE($6, title),
            updated_at = NOW()
        WHERE id = $1 AND organization_id = $2
        RETURNING *"#,
    )
    .bind(coach_id)
    .bind(access.organization_id)
    .bind(body.team_id)
    .bind(name)
    .bind(&body.email)
    .bind(&body.title)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Coach not found".into()))?;

    Ok(Json(json!({ "coach": coach })))
}

pub async fn delete_coach(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, coach_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    access.require(Role::Coach)?;
    let result = sqlx::query("DELETE FROM coaches WHERE id = $1 AND organization_id = $2")
        .bind(coach_id)
        .bind(access.organization_id)
        .execute(&state.db)
        .await?;
    deleted(result.rows_affected(), "Coach")
}
