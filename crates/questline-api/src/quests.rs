use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use questline_db::models::{DailyTaskRow, NewQuest, NewTask, ParticipantRow, QuestRow};
use questline_types::api::{
    Claims, CreateQuestRequest, DailyTaskResponse, JoinQuestRequest, ParticipantResponse,
    QuestResponse,
};

use crate::auth::AppState;
use crate::convert::{parse_date, parse_timestamp, parse_uuid};
use crate::error::ApiError;

/// Share codes are 9 numeric digits, valid for 3 days.
const SHARE_CODE_LEN: usize = 9;
const SHARE_CODE_TTL_DAYS: i64 = 3;

fn generate_share_code() -> String {
    let mut rng = rand::rng();
    (0..SHARE_CODE_LEN)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

pub async fn create_quest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateQuestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("quest name must not be empty".into()));
    }
    if req.end_date < req.start_date {
        return Err(ApiError::BadRequest(
            "end_date must not precede start_date".into(),
        ));
    }
    if req.daily_tasks.iter().any(|t| t.points <= 0) {
        return Err(ApiError::BadRequest("task points must be positive".into()));
    }

    let quest_id = Uuid::new_v4().to_string();
    let creator_id = claims.sub.to_string();
    let share_code = generate_share_code();
    let expires_at = (Utc::now() + chrono::Duration::days(SHARE_CODE_TTL_DAYS)).to_rfc3339();
    let start_date = req.start_date.to_string();
    let end_date = req.end_date.to_string();

    let task_ids: Vec<String> = req
        .daily_tasks
        .iter()
        .map(|_| Uuid::new_v4().to_string())
        .collect();
    let tasks: Vec<NewTask<'_>> = req
        .daily_tasks
        .iter()
        .zip(&task_ids)
        .map(|(task, id)| NewTask {
            id,
            title: &task.title,
            description: task.description.as_deref(),
            points: task.points,
        })
        .collect();

    state.db.create_quest(
        &NewQuest {
            id: &quest_id,
            name: &req.name,
            description: req.description.as_deref(),
            start_date: &start_date,
            end_date: &end_date,
            creator_id: &creator_id,
            share_code: &share_code,
            share_code_expires_at: &expires_at,
        },
        &tasks,
    )?;

    // Re-read for canonical created_at / joined_at values.
    let quest = state
        .db
        .get_quest(&quest_id)?
        .ok_or_else(|| ApiError::Internal(anyhow!("quest missing right after insert")))?;
    let tasks = state.db.tasks_for_quest(&quest_id)?;
    let participants = state.db.participants_for_quest(&quest_id)?;

    Ok((
        StatusCode::CREATED,
        Json(to_quest_response(quest, tasks, participants)),
    ))
}

pub async fn list_quests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.quests_for_user(&claims.sub.to_string())?;

    let mut quests = Vec::with_capacity(rows.len());
    for row in rows {
        let tasks = state.db.tasks_for_quest(&row.id)?;
        quests.push(to_quest_response(row, tasks, vec![]));
    }

    Ok(Json(quests))
}

pub async fn get_quest(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let quest_id = quest_id.to_string();
    let user_id = claims.sub.to_string();

    state
        .db
        .get_participant(&quest_id, &user_id)?
        .ok_or(ApiError::NotParticipant)?;

    let quest = state
        .db
        .get_quest(&quest_id)?
        .ok_or(ApiError::NotFound("quest"))?;
    let tasks = state.db.tasks_for_quest(&quest_id)?;
    let participants = state.db.participants_for_quest(&quest_id)?;

    Ok(Json(to_quest_response(quest, tasks, participants)))
}

pub async fn join_quest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinQuestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let quest = state
        .db
        .get_quest_by_share_code(&req.share_code)?
        .ok_or(ApiError::NotFound("quest"))?;

    let expires_at = parse_timestamp(&quest.share_code_expires_at);
    if Utc::now() >= expires_at {
        return Err(ApiError::BadRequest("share code has expired".into()));
    }

    let user_id = claims.sub.to_string();
    if state.db.get_participant(&quest.id, &user_id)?.is_some() {
        return Err(ApiError::Conflict(
            "already a participant of this quest".into(),
        ));
    }

    state.db.add_participant(&quest.id, &user_id)?;

    let participant = state
        .db
        .get_participant(&quest.id, &user_id)?
        .ok_or_else(|| ApiError::Internal(anyhow!("participant missing right after join")))?;

    Ok(Json(to_participant_response(participant)))
}

pub(crate) fn to_quest_response(
    quest: QuestRow,
    tasks: Vec<DailyTaskRow>,
    participants: Vec<ParticipantRow>,
) -> QuestResponse {
    QuestResponse {
        id: parse_uuid(&quest.id, "quest id"),
        name: quest.name,
        description: quest.description,
        start_date: parse_date(&quest.start_date, "start_date"),
        end_date: parse_date(&quest.end_date, "end_date"),
        creator_id: parse_uuid(&quest.creator_id, "creator_id"),
        share_code: quest.share_code,
        share_code_expires_at: parse_timestamp(&quest.share_code_expires_at),
        created_at: parse_timestamp(&quest.created_at),
        daily_tasks: tasks
            .into_iter()
            .map(|task| DailyTaskResponse {
                id: parse_uuid(&task.id, "task id"),
                quest_id: parse_uuid(&task.quest_id, "quest_id"),
                title: task.title,
                description: task.description,
                points: task.points,
            })
            .collect(),
        participants: participants.into_iter().map(to_participant_response).collect(),
    }
}

pub(crate) fn to_participant_response(participant: ParticipantRow) -> ParticipantResponse {
    ParticipantResponse {
        quest_id: parse_uuid(&participant.quest_id, "quest_id"),
        user_id: parse_uuid(&participant.user_id, "user_id"),
        username: participant.username,
        joined_at: parse_timestamp(&participant.joined_at),
        total_points: participant.total_points,
    }
}
