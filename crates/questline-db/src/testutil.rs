use std::sync::Mutex;

use rusqlite::Connection;

use crate::Database;

/// In-memory database seeded with two users (alice, bob), quest "q-1"
/// created by alice with task "t-1" worth 10 points, and alice as the
/// only participant.
pub(crate) fn seeded_db() -> Database {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    crate::migrations::run(&conn).unwrap();

    conn.execute_batch(
        "INSERT INTO users (id, username, password) VALUES
             ('u-alice', 'alice', 'x'),
             ('u-bob', 'bob', 'x');
         INSERT INTO quests (id, name, start_date, end_date, creator_id, share_code, share_code_expires_at)
             VALUES ('q-1', 'Morning runs', '2024-01-01', '2024-12-31', 'u-alice', '123456789', '2099-01-01T00:00:00Z');
         INSERT INTO daily_tasks (id, quest_id, title, points) VALUES ('t-1', 'q-1', 'Run 5k', 10);
         INSERT INTO quest_participants (quest_id, user_id) VALUES ('q-1', 'u-alice');",
    )
    .unwrap();

    Database {
        conn: Mutex::new(conn),
    }
}
