use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared between questline-api (REST middleware) and the
/// WebSocket subscription endpoint. Canonical definition lives here so
/// both layers decode the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Quests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateQuestRequest {
    pub name: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub daily_tasks: Vec<CreateTaskRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_task_points")]
    pub points: i64,
}

fn default_task_points() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinQuestRequest {
    pub share_code: String,
}

#[derive(Debug, Serialize)]
pub struct QuestResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub creator_id: Uuid,
    pub share_code: String,
    pub share_code_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub daily_tasks: Vec<DailyTaskResponse>,
    pub participants: Vec<ParticipantResponse>,
}

#[derive(Debug, Serialize)]
pub struct DailyTaskResponse {
    pub id: Uuid,
    pub quest_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub points: i64,
}

#[derive(Debug, Serialize)]
pub struct ParticipantResponse {
    pub quest_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub total_points: i64,
}

// -- Check-ins --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckInRequest {
    pub daily_task_id: Uuid,
    pub check_in_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecrementRequest {
    pub daily_task_id: Uuid,
    pub check_in_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct CheckInResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub quest_id: Uuid,
    pub daily_task_id: Uuid,
    pub check_in_date: NaiveDate,
    pub count: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub quest_id: Uuid,
    pub user_id: Uuid,
    pub total_check_ins: i64,
    pub total_points: i64,
    pub current_streak: u32,
    pub longest_streak: u32,
}
