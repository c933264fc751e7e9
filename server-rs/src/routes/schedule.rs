use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::membership::OrgAccess;
use crate::models::organization::Role;
use crate::models::schedule::*;
use crate::routes::roster::{ensure_team, required};
use crate::AppState;

fn check_event_type(value: &str) -> AppResult<()> {
    if !is_valid_event_type(value) {
        return Err(AppError::BadRequest(format!(
            "Event type must be one of: {}",
            EVENT_TYPES.join(", ")
        )));
    }
    Ok(())
}

fn check_scores(home: Option<i32>, away: Option<i32>) -> AppResult<()> {
    if home.is_some_and(|s| s < 0) || away.is_some_and(|s| s < 0) {
        return Err(AppError::BadRequest("Scores cannot be negative".into()));
    }
    Ok(())
}

// --- Events ---

pub async fn list_events(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Query(query): Query<ScheduleQuery>,
) -> AppResult<Json<Value>> {
    let events: Vec<ScheduleEvent> = sqlx::query_as(
        r#"SELECT * FROM schedule_events
        WHERE organization_id = $1
          AND ($2::uuid IS NULL OR team_id = $2)
          AND ($3::timestamptz IS NULL OR starts_at >= $3)
        ORDER BY starts_at"#,
    )
    .bind(access.organization_id)
    .bind(query.team_id)
    .bind(query.from)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "events": events })))
}

pub async fn create_event(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    access.require(Role::Coach)?;
    let title = required(&body.title, "Title")?;
    let event_type = body.event_type.unwrap_or_else(|| "practice".to_string());
    check_event_type(&event_type)?;
    if !is_valid_time_range(body.starts_at, body.ends_at) {
        return Err(AppError::BadRequest("Event cannot end before it starts".into()));
    }
    if let Some(team_id) = body.team_id {
        ensure_team(&state.db, access.organization_id, team_id).await?;
    }

    let event: ScheduleEvent = sqlx::query_as(
        r#"INSERT INTO schedule_events (id, organization_id, team_id, title, event_type, location, starts_at, ends_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(access.organization_id)
    .bind(body.team_id)
    .bind(&title)
    .bind(&event_type)
    .bind(&body.location)
    .bind(body.starts_at)
    .bind(body.ends_at)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "event": event }))))
}

pub async fn update_event(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, event_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateEventRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Coach)?;
    let title = body.title.as_deref().map(|t| required(t, "Title")).transpose()?;
    if let Some(event_type) = &body.event_type {
        check_event_type(event_type)?;
    }
    if let Some(team_id) = body.team_id {
        ensure_team(&state.db, access.organization_id, team_id).await?;
    }

    let mut tx = state.db.begin().await?;
    let current: ScheduleEvent = sqlx::query_as(
        "SELECT * FROM schedule_events WHERE id = $1 AND organization_id = $2 FOR UPDATE",
    )
    .bind(event_id)
    .bind(access.organization_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Event not found".into()))?;

    let starts_at = body.starts_at.unwrap_or(current.starts_at);
    let ends_at = body.ends_at.or(current.ends_at);
    if !is_valid_time_range(starts_at, ends_at) {
        return Err(AppError::BadRequest("Event cannot end before it starts".into()));
    }

    let event: ScheduleEvent = sqlx::query_as(
        r#"UPDATE schedule_events SET
            team_id = COALESCE($3, team_id),
            title = COALESCE($4, title),
            event_type = COALESCE($5, event_type),
            location = COALESCE($6, location),
            starts_at = $7,
            ends_at = $8,
            updated_at = NOW()
        WHERE id = $1 AND organization_id = $2
        RETURNING *"#,
    )
    .bind(event_id)
    .bind(access.organization_id)
    .bind(body.team_id)
    .bind(title)
    .bind(&body.event_type)
    .bind(&body.location)
    .bind(starts_at)
    .bind(ends_at)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Json(json!({ "event": event })))
}

pub async fn delete_event(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, event_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    access.require(Role::Coach)?;
    let result = sqlx::query("DELETE FROM schedule_events WHERE id = $1 AND organization_id = $2")
        .bind(event_id)
        .bind(access.organization_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Event not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Games ---

pub async fn list_games(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Query(query): Query<ScheduleQuery>,
) -> AppResult<Json<Value>> {
    let games: Vec<Game> = sqlx::query_as(
        r#"SELECT * FROM games
        WHERE organization_id = $1
          AND ($2::uuid IS NULL OR team_id = $2)
          AND ($3::timestamptz IS NULL OR starts_at >= $3)
        ORDER BY starts_at DESC"#,
    )
    .bind(access.organization_id)
    .bind(query.team_id)
    .bind(query.from)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "games": games })))
}

pub async fn create_game(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Json(body): Json<CreateGameRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    access.require(Role::Coach)?;
    let opponent = required(&body.opponent, "Opponent")?;
    ensure_team(&state.db, access.organization_id, body.team_id).await?;

    let game: Game = sqlx::query_as(
        r#"INSERT INTO games (id, organization_id, team_id, opponent, starts_at, location)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(access.organization_id)
    .bind(body.team_id)
    .bind(&opponent)
    .bind(body.starts_at)
    .bind(&body.location)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "game": game }))))
}

pub async fn update_score(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, game_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ScoreUpdateRequest>,
) -> AppResult<Json<Value>> {
    access.require(Role::Coach)?;
    check_scores(body.home_score, body.away_score)?;
    if let Some(status) = &body.status {
        if !is_valid_game_status(status) {
            return Err(AppError::BadRequest(format!(
                "Status must be one of: {}",
                GAME_STATUSES.join(", ")
            )));
        }
    }

    let game: Game = sqlx::query_as(
        r#"UPDATE games SET
            home_score = COALESCE($3, home_score),
            away_score = COALESCE($4, away_score),
            status = COALESCE($5, status),
            updated_at = NOW()
        WHERE id = $1 AND organization_id = $2
        RETURNING *"#,
    )
    .bind(game_id)
    .bind(access.organization_id)
    .bind(body.home_score)
    .bind(body.away_score)
    .bind(&body.status)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Game not found".into()))?;

    tracing::debug!(%game_id, home = game.home_score, away = game.away_score, "Score updated");
    Ok(Json(json!({ "game": game })))
}

pub async fn delete_game(
    State(state): State<AppState>,
    access: axum::Extension<OrgAccess>,
    Path((_, game_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    access.require(Role::Coach)?;
    let result = sqlx::query("DELETE FROM games WHERE id = $1 AND organization_id = $2")
        .bind(game_id)
        .bind(access.organization_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Game not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_scores_are_rejected() {
        assert!(check_scores(Some(3), Some(0)).is_ok());
        assert!(check_scores(None, None).is_ok());
        assert!(check_scores(Some(-1), None).is_err());
        assert!(check_scores(None, Some(-2)).is_err());
    }

    #[test]
    fn unknown_event_types_are_rejected() {
        assert!(check_event_type("tournament").is_ok());
        let err = check_event_type("party").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("practice, game")));
    }
}
