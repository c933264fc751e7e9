use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub season: Option<String>,
    pub age_group: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub team_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub jersey_number: Option<i32>,
    pub position: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coach {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub season: Option<String>,
    #[serde(rename = "ageGroup")]
    pub age_group: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub season: Option<String>,
    #[serde(rename = "ageGroup")]
    pub age_group: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlayerRequest {
    #[serde(rename = "teamId")]
    pub team_id: Uuid,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(rename = "jerseyNumber")]
    pub jersey_number: Option<i32>,
    pub position: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlayerRequest {
    #[serde(rename = "teamId")]
    pub team_id: Option<Uuid>,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
    #[serde(rename = "jerseyNumber")]
    pub jersey_number: Option<i32>,
    pub position: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCoachRequest {
    #[serde(rename = "teamId")]
    pub team_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCoachRequest {
    #[serde(rename = "teamId")]
    pub team_id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TeamFilter {
    #[serde(rename = "teamId")]
    pub team_id: Option<Uuid>,
}

pub fn is_valid_jersey_number(number: i32) -> bool {
    (0..=99).contains(&number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jersey_numbers_are_two_digits() {
        assert!(is_valid_jersey_number(0));
        assert!(is_valid_jersey_number(99));
        assert!(!is_valid_jersey_number(100));
        assert!(!is_valid_jersey_number(-1));
    }

    #[test]
    fn player_request_uses_camel_case() {
        let req: CreatePlayerRequest = serde_json::from_str(
            r#"{"teamId":"6f9619ff-8b86-d011-b42d-00c04fc964ff","firstName":"Sam","lastName":"Lee","jerseyNumber":7}"#,
        )
        .unwrap();
        assert_eq!(req.first_name, "Sam");
        assert_eq!(req.jersey_number, Some(7));
        assert!(req.position.is_none());
    }
}
