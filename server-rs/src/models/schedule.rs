use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_TYPES: &[&str] = &["practice", "game", "tournament", "other"];
pub const GAME_STATUSES: &[&str] = &["scheduled", "live", "final"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleEvent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub team_id: Option<Uuid>,
    pub title: String,
    pub event_type: String,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A game with its live score.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Game {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub team_id: Uuid,
    pub opponent: String,
    pub starts_at: DateTime<Utc>,
    pub location: Option<String>,
    pub home_score: i32,
    pub away_score: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    #[serde(rename = "teamId")]
    pub team_id: Option<Uuid>,
    pub title: String,
    #[serde(rename = "eventType")]
    pub event_type: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    #[serde(rename = "endsAt")]
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    #[serde(rename = "teamId")]
    pub team_id: Option<Uuid>,
    pub title: Option<String>,
    #[serde(rename = "eventType")]
    pub event_type: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "startsAt")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(rename = "endsAt")]
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    #[serde(rename = "teamId")]
    pub team_id: Uuid,
    pub opponent: String,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScoreUpdateRequest {
    #[serde(rename = "homeScore")]
    pub home_score: Option<i32>,
    #[serde(rename = "awayScore")]
    pub away_score: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    #[serde(rename = "teamId")]
    pub team_id: Option<Uuid>,
    /// Only events starting at or after this instant.
    pub from: Option<DateTime<Utc>>,
}

pub fn is_valid_event_type(value: &str) -> bool {
    EVENT_TYPES.contains(&value)
}

pub fn is_valid_game_status(value: &str) -> bool {
    GAME_STATUSES.contains(&value)
}

/// An event may not end before it starts.
pub fn is_valid_time_range(starts_at: DateTime<Utc>, ends_at: Option<DateTime<Utc>>) -> bool {
    ends_at.map_or(true, |end| end >= starts_at)
}
