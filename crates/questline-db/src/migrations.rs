use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS quests (
            id                      TEXT PRIMARY KEY,
            name                    TEXT NOT NULL,
            description             TEXT,
            start_date              TEXT NOT NULL,
            end_date                TEXT NOT NULL,
            creator_id              TEXT NOT NULL REFERENCES users(id),
            share_code              TEXT NOT NULL UNIQUE,
            share_code_expires_at   TEXT NOT NULL,
            created_at              TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS daily_tasks (
            id          TEXT PRIMARY KEY,
            quest_id    TEXT NOT NULL REFERENCES quests(id),
            title       TEXT NOT NULL,
            description TEXT,
            points      INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_daily_tasks_quest
            ON daily_tasks(quest_id);

        CREATE TABLE IF NOT EXISTS quest_participants (
            quest_id        TEXT NOT NULL REFERENCES quests(id),
            user_id         TEXT NOT NULL REFERENCES users(id),
            joined_at       TEXT NOT NULL DEFAULT (datetime('now')),
            total_points    INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (quest_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON quest_participants(user_id);

        CREATE TABLE IF NOT EXISTS check_ins (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id),
            quest_id        TEXT NOT NULL REFERENCES quests(id),
            daily_task_id   TEXT NOT NULL REFERENCES daily_tasks(id),
            check_in_date   TEXT NOT NULL,
            count           INTEGER NOT NULL,
            notes           TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT,
            UNIQUE(user_id, daily_task_id, check_in_date)
        );

        CREATE INDEX IF NOT EXISTS idx_check_ins_quest_user
            ON check_ins(quest_id, user_id, check_in_date);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
