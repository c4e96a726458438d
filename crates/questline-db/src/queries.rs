use crate::Database;
use crate::models::{CheckInRow, DailyTaskRow, NewQuest, NewTask, ParticipantRow, QuestRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

const QUEST_COLUMNS: &str =
    "id, name, description, start_date, end_date, creator_id, share_code, share_code_expires_at, created_at";

const CHECK_IN_COLUMNS: &str =
    "id, user_id, quest_id, daily_task_id, check_in_date, count, notes, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Quests --

    /// Insert a quest with its tasks and seed the creator's participant row.
    /// One transaction: a quest never exists without its creator in it.
    pub fn create_quest(&self, quest: &NewQuest<'_>, tasks: &[NewTask<'_>]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO quests (id, name, description, start_date, end_date, creator_id, share_code, share_code_expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    quest.id,
                    quest.name,
                    quest.description,
                    quest.start_date,
                    quest.end_date,
                    quest.creator_id,
                    quest.share_code,
                    quest.share_code_expires_at,
                ],
            )?;

            for task in tasks {
                tx.execute(
                    "INSERT INTO daily_tasks (id, quest_id, title, description, points)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![task.id, quest.id, task.title, task.description, task.points],
                )?;
            }

            tx.execute(
                "INSERT INTO quest_participants (quest_id, user_id) VALUES (?1, ?2)",
                params![quest.id, quest.creator_id],
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_quest(&self, id: &str) -> Result<Option<QuestRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {QUEST_COLUMNS} FROM quests WHERE id = ?1"),
                    [id],
                    QuestRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_quest_by_share_code(&self, share_code: &str) -> Result<Option<QuestRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {QUEST_COLUMNS} FROM quests WHERE share_code = ?1"),
                    [share_code],
                    QuestRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn quests_for_user(&self, user_id: &str) -> Result<Vec<QuestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT q.id, q.name, q.description, q.start_date, q.end_date, q.creator_id,
                        q.share_code, q.share_code_expires_at, q.created_at
                 FROM quests q
                 JOIN quest_participants p ON p.quest_id = q.id
                 WHERE p.user_id = ?1
                 ORDER BY q.created_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], QuestRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn tasks_for_quest(&self, quest_id: &str) -> Result<Vec<DailyTaskRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, quest_id, title, description, points
                 FROM daily_tasks
                 WHERE quest_id = ?1
                 ORDER BY created_at",
            )?;

            let rows = stmt
                .query_map([quest_id], |row| {
                    Ok(DailyTaskRow {
                        id: row.get(0)?,
                        quest_id: row.get(1)?,
                        title: row.get(2)?,
                        description: row.get(3)?,
                        points: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Participants --

    pub fn add_participant(&self, quest_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO quest_participants (quest_id, user_id) VALUES (?1, ?2)",
                (quest_id, user_id),
            )?;
            Ok(())
        })
    }

    pub fn get_participant(&self, quest_id: &str, user_id: &str) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT p.quest_id, p.user_id, u.username, p.joined_at, p.total_points
                     FROM quest_participants p
                     JOIN users u ON u.id = p.user_id
                     WHERE p.quest_id = ?1 AND p.user_id = ?2",
                    (quest_id, user_id),
                    map_participant,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Scoreboard order: highest points first, earliest joiner breaking ties.
    pub fn participants_for_quest(&self, quest_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.quest_id, p.user_id, u.username, p.joined_at, p.total_points
                 FROM quest_participants p
                 JOIN users u ON u.id = p.user_id
                 WHERE p.quest_id = ?1
                 ORDER BY p.total_points DESC, p.joined_at",
            )?;

            let rows = stmt
                .query_map([quest_id], map_participant)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Check-in reads (mutations live in ledger.rs) --

    /// A user's check-ins in a quest, newest first. `month` filters to a
    /// "YYYY-MM" calendar month.
    pub fn checkins_for_quest_user(
        &self,
        quest_id: &str,
        user_id: &str,
        month: Option<&str>,
    ) -> Result<Vec<CheckInRow>> {
        self.with_conn(|conn| {
            let rows = match month {
                Some(month) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CHECK_IN_COLUMNS} FROM check_ins
                         WHERE quest_id = ?1 AND user_id = ?2 AND substr(check_in_date, 1, 7) = ?3
                         ORDER BY check_in_date DESC"
                    ))?;
                    stmt.query_map(params![quest_id, user_id, month], CheckInRow::from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CHECK_IN_COLUMNS} FROM check_ins
                         WHERE quest_id = ?1 AND user_id = ?2
                         ORDER BY check_in_date DESC"
                    ))?;
                    stmt.query_map(params![quest_id, user_id], CheckInRow::from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };

            Ok(rows)
        })
    }

    /// Same rows ordered date-ascending, the order the streak walk needs.
    pub fn checkins_for_stats(&self, quest_id: &str, user_id: &str) -> Result<Vec<CheckInRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHECK_IN_COLUMNS} FROM check_ins
                 WHERE quest_id = ?1 AND user_id = ?2
                 ORDER BY check_in_date"
            ))?;

            let rows = stmt
                .query_map(params![quest_id, user_id], CheckInRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password, created_at FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        quest_id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        joined_at: row.get(3)?,
        total_points: row.get(4)?,
    })
}
