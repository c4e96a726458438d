/// Database row types — these map directly to SQLite rows.
/// Distinct from questline-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct QuestRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub creator_id: String,
    pub share_code: String,
    pub share_code_expires_at: String,
    pub created_at: String,
}

pub struct DailyTaskRow {
    pub id: String,
    pub quest_id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i64,
}

/// Participant joined with users for the display name; ordered by
/// total_points when fetched for a scoreboard.
pub struct ParticipantRow {
    pub quest_id: String,
    pub user_id: String,
    pub username: String,
    pub joined_at: String,
    pub total_points: i64,
}

#[derive(Debug)]
pub struct CheckInRow {
    pub id: String,
    pub user_id: String,
    pub quest_id: String,
    pub daily_task_id: String,
    pub check_in_date: String,
    pub count: i64,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl QuestRow {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(QuestRow {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            start_date: row.get(3)?,
            end_date: row.get(4)?,
            creator_id: row.get(5)?,
            share_code: row.get(6)?,
            share_code_expires_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl CheckInRow {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(CheckInRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            quest_id: row.get(2)?,
            daily_task_id: row.get(3)?,
            check_in_date: row.get(4)?,
            count: row.get(5)?,
            notes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

/// Insert payloads for quest creation, borrowed from the handler's request.
pub struct NewQuest<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub start_date: &'a str,
    pub end_date: &'a str,
    pub creator_id: &'a str,
    pub share_code: &'a str,
    pub share_code_expires_at: &'a str,
}

pub struct NewTask<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub points: i64,
}
