use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use questline_db::models::CheckInRow;
use questline_types::api::{
    CheckInRequest, CheckInResponse, Claims, DecrementRequest, StatsResponse,
};
use questline_types::events::RoomEvent;

use crate::auth::AppState;
use crate::convert::{parse_date, parse_timestamp, parse_uuid};
use crate::error::ApiError;
use crate::stats::compute_streaks;

pub async fn increment(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CheckInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Run the blocking ledger transaction off the async runtime
    let db = state.clone();
    let qid = quest_id.to_string();
    let uid = claims.sub.to_string();
    let tid = req.daily_task_id.to_string();
    let date = req.check_in_date;
    let notes = req.notes;

    let row = tokio::task::spawn_blocking(move || {
        db.db.increment_check_in(&qid, &uid, &tid, date, notes.as_deref())
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("spawn_blocking join error: {}", e)))??;

    // The actor is not excluded: it reconciles by re-fetching like everyone.
    state
        .registry
        .broadcast(quest_id, RoomEvent::ScoreboardUpdate { quest_id }, None)
        .await;

    Ok((StatusCode::CREATED, Json(to_check_in_response(row))))
}

pub async fn decrement(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DecrementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let qid = quest_id.to_string();
    let uid = claims.sub.to_string();
    let tid = req.daily_task_id.to_string();
    let date = req.check_in_date;

    let row = tokio::task::spawn_blocking(move || {
        db.db.decrement_check_in(&qid, &uid, &tid, date)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("spawn_blocking join error: {}", e)))??;

    state
        .registry
        .broadcast(quest_id, RoomEvent::ScoreboardUpdate { quest_id }, None)
        .await;

    // A cell that drained to zero is a normal outcome, not an error.
    let body = match row {
        Some(row) => serde_json::json!(to_check_in_response(row)),
        None => serde_json::json!({ "cleared": true }),
    };

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct CheckInQuery {
    /// Calendar month filter, "YYYY-MM".
    pub month: Option<String>,
}

pub async fn list_checkins(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Query(query): Query<CheckInQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(month) = &query.month {
        if NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_err() {
            return Err(ApiError::BadRequest("month must be formatted YYYY-MM".into()));
        }
    }

    let db = state.clone();
    let qid = quest_id.to_string();
    let uid = claims.sub.to_string();
    let month = query.month;

    let rows = tokio::task::spawn_blocking(move || -> Result<Vec<CheckInRow>, ApiError> {
        if db.db.get_participant(&qid, &uid)?.is_none() {
            return Err(ApiError::NotParticipant);
        }
        Ok(db.db.checkins_for_quest_user(&qid, &uid, month.as_deref())?)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("spawn_blocking join error: {}", e)))??;

    let checkins: Vec<CheckInResponse> = rows.into_iter().map(to_check_in_response).collect();
    Ok(Json(checkins))
}

pub async fn stats(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let qid = quest_id.to_string();
    let uid = claims.sub.to_string();

    let (participant, rows) = tokio::task::spawn_blocking(move || {
        let participant = db
            .db
            .get_participant(&qid, &uid)?
            .ok_or(ApiError::NotParticipant)?;
        let rows = db.db.checkins_for_stats(&qid, &uid)?;
        Ok::<_, ApiError>((participant, rows))
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("spawn_blocking join error: {}", e)))??;

    let total_check_ins: i64 = rows.iter().map(|row| row.count).sum();
    let dates = distinct_dates(&rows);

    let today = Utc::now().date_naive();
    let (current_streak, longest_streak) = compute_streaks(&dates, today);

    Ok(Json(StatsResponse {
        quest_id,
        user_id: claims.sub,
        total_check_ins,
        total_points: participant.total_points,
        current_streak,
        longest_streak,
    }))
}

/// Several tasks checked in on one date are one date for the streak walk.
/// Rows arrive date-ascending, so adjacent duplicates collapse.
fn distinct_dates(rows: &[CheckInRow]) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = rows
        .iter()
        .map(|row| parse_date(&row.check_in_date, "check_in_date"))
        .collect();
    dates.dedup();
    dates
}

fn to_check_in_response(row: CheckInRow) -> CheckInResponse {
    CheckInResponse {
        id: parse_uuid(&row.id, "check-in id"),
        user_id: parse_uuid(&row.user_id, "user_id"),
        quest_id: parse_uuid(&row.quest_id, "quest_id"),
        daily_task_id: parse_uuid(&row.daily_task_id, "daily_task_id"),
        check_in_date: parse_date(&row.check_in_date, "check_in_date"),
        count: row.count,
        notes: row.notes,
        created_at: parse_timestamp(&row.created_at),
        updated_at: row.updated_at.as_deref().map(parse_timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(task_id: &str, date: &str, count: i64) -> CheckInRow {
        CheckInRow {
            id: format!("c-{task_id}-{date}"),
            user_id: "u-1".into(),
            quest_id: "q-1".into(),
            daily_task_id: task_id.into(),
            check_in_date: date.into(),
            count,
            notes: None,
            created_at: "2024-01-01 08:00:00".into(),
            updated_at: None,
        }
    }

    #[test]
    fn same_date_tasks_collapse_for_streaks_but_not_totals() {
        let rows = vec![
            row("t-1", "2024-01-01", 1),
            row("t-2", "2024-01-01", 1),
            row("t-1", "2024-01-02", 1),
        ];

        let dates = distinct_dates(&rows);
        assert_eq!(
            dates,
            vec![
                "2024-01-01".parse::<NaiveDate>().unwrap(),
                "2024-01-02".parse::<NaiveDate>().unwrap(),
            ]
        );

        let total: i64 = rows.iter().map(|r| r.count).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn multi_count_rows_weigh_their_full_count() {
        let rows = vec![row("t-1", "2024-01-01", 3)];
        let total: i64 = rows.iter().map(|r| r.count).sum();
        assert_eq!(total, 3);
        assert_eq!(distinct_dates(&rows).len(), 1);
    }
}
