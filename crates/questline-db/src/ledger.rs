//! Check-in ledger: the only code path that mutates `check_ins` rows or
//! `quest_participants.total_points`. Each operation runs in one immediate
//! transaction on the shared connection, so the count and the point total
//! move together or not at all, and concurrent callers on the same
//! (user, task, date) cell never interleave a read-modify-write.

use chrono::NaiveDate;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::Database;
use crate::models::CheckInRow;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not a participant of this quest")]
    NotParticipant,
    #[error("task not found in this quest")]
    TaskNotFound,
    #[error("no check-in exists for this task and date")]
    CheckInNotFound,
    #[error("store unavailable")]
    Unavailable,
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl Database {
    /// Record one more completion of `task_id` by `user_id` on `date`.
    /// Creates the cell at count 1 or bumps an existing count, credits
    /// the task's points to the participant, and returns the row.
    pub fn increment_check_in(
        &self,
        quest_id: &str,
        user_id: &str,
        task_id: &str,
        date: NaiveDate,
        notes: Option<&str>,
    ) -> Result<CheckInRow, LedgerError> {
        self.ledger_op(|conn| increment_in_tx(conn, quest_id, user_id, task_id, date, notes))
    }

    /// Undo one completion. Returns the surviving row, or `None` when the
    /// count reached zero and the row was deleted — a normal outcome,
    /// distinct from `CheckInNotFound` for a cell that never existed.
    pub fn decrement_check_in(
        &self,
        quest_id: &str,
        user_id: &str,
        task_id: &str,
        date: NaiveDate,
    ) -> Result<Option<CheckInRow>, LedgerError> {
        self.ledger_op(|conn| decrement_in_tx(conn, quest_id, user_id, task_id, date))
    }

    /// Run `f` inside an immediate transaction, retrying once with a fresh
    /// transaction if the store reports contention.
    fn ledger_op<T>(
        &self,
        f: impl Fn(&Connection) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        match self.try_ledger_op(&f) {
            Err(LedgerError::Store(e)) if is_contention(&e) => {
                debug!("ledger transaction lost a race, retrying once");
                self.try_ledger_op(&f)
            }
            other => other,
        }
    }

    fn try_ledger_op<T>(
        &self,
        f: &impl Fn(&Connection) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut conn = self.conn.lock().map_err(|_| LedgerError::Unavailable)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

fn increment_in_tx(
    conn: &Connection,
    quest_id: &str,
    user_id: &str,
    task_id: &str,
    date: NaiveDate,
    notes: Option<&str>,
) -> Result<CheckInRow, LedgerError> {
    require_participant(conn, quest_id, user_id)?;
    let points = task_points(conn, quest_id, task_id)?;
    let date = date.to_string();

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM check_ins
             WHERE user_id = ?1 AND daily_task_id = ?2 AND check_in_date = ?3",
            params![user_id, task_id, date],
            |row| row.get(0),
        )
        .optional()?;

    let id = match existing {
        Some(id) => {
            // New notes replace stored notes; absent notes keep them.
            conn.execute(
                "UPDATE check_ins
                 SET count = count + 1, notes = COALESCE(?2, notes), updated_at = datetime('now')
                 WHERE id = ?1",
                params![id, notes],
            )?;
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO check_ins (id, user_id, quest_id, daily_task_id, check_in_date, count, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
                params![id, user_id, quest_id, task_id, date, notes],
            )?;
            id
        }
    };

    conn.execute(
        "UPDATE quest_participants SET total_points = total_points + ?3
         WHERE quest_id = ?1 AND user_id = ?2",
        params![quest_id, user_id, points],
    )?;

    fetch_check_in(conn, &id)
}

fn decrement_in_tx(
    conn: &Connection,
    quest_id: &str,
    user_id: &str,
    task_id: &str,
    date: NaiveDate,
) -> Result<Option<CheckInRow>, LedgerError> {
    require_participant(conn, quest_id, user_id)?;
    let points = task_points(conn, quest_id, task_id)?;
    let date = date.to_string();

    let existing: Option<(String, i64)> = conn
        .query_row(
            "SELECT id, count FROM check_ins
             WHERE user_id = ?1 AND daily_task_id = ?2 AND check_in_date = ?3",
            params![user_id, task_id, date],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, count)) = existing else {
        return Err(LedgerError::CheckInNotFound);
    };

    // A row never stays at count 0: delete instead.
    let row = if count > 1 {
        conn.execute(
            "UPDATE check_ins SET count = count - 1, updated_at = datetime('now') WHERE id = ?1",
            [&id],
        )?;
        Some(fetch_check_in(conn, &id)?)
    } else {
        conn.execute("DELETE FROM check_ins WHERE id = ?1", [&id])?;
        None
    };

    // Floored at zero: an over-counted removal must never go negative.
    conn.execute(
        "UPDATE quest_participants SET total_points = MAX(total_points - ?3, 0)
         WHERE quest_id = ?1 AND user_id = ?2",
        params![quest_id, user_id, points],
    )?;

    Ok(row)
}

fn require_participant(conn: &Connection, quest_id: &str, user_id: &str) -> Result<(), LedgerError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM quest_participants WHERE quest_id = ?1 AND user_id = ?2",
            params![quest_id, user_id],
            |row| row.get(0),
        )
        .optional()?;

    if exists.is_none() {
        return Err(LedgerError::NotParticipant);
    }
    Ok(())
}

fn task_points(conn: &Connection, quest_id: &str, task_id: &str) -> Result<i64, LedgerError> {
    conn.query_row(
        "SELECT points FROM daily_tasks WHERE id = ?1 AND quest_id = ?2",
        params![task_id, quest_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(LedgerError::TaskNotFound)
}

fn fetch_check_in(conn: &Connection, id: &str) -> Result<CheckInRow, LedgerError> {
    let row = conn.query_row(
        "SELECT id, user_id, quest_id, daily_task_id, check_in_date, count, notes, created_at, updated_at
         FROM check_ins WHERE id = ?1",
        [id],
        CheckInRow::from_row,
    )?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::seeded_db;
    use std::sync::Arc;

    // testutil seeds quest "q-1" with task "t-1" worth 10 points and
    // participants: alice (member), bob (not a member).
    const QUEST: &str = "q-1";
    const TASK: &str = "t-1";
    const ALICE: &str = "u-alice";
    const BOB: &str = "u-bob";
    const POINTS: i64 = 10;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn total_points(db: &Database, user: &str) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT total_points FROM quest_participants WHERE quest_id = ?1 AND user_id = ?2",
                params![QUEST, user],
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn repeated_increments_accumulate() {
        let db = seeded_db();

        for expected in 1..=4 {
            let row = db
                .increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), None)
                .unwrap();
            assert_eq!(row.count, expected);
            assert_eq!(total_points(&db, ALICE), expected * POINTS);
        }

        let rows = db.checkins_for_quest_user(QUEST, ALICE, None).unwrap();
        assert_eq!(rows.len(), 1, "same cell must stay one row");
    }

    #[test]
    fn first_increment_creates_row_with_notes() {
        let db = seeded_db();

        let row = db
            .increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), Some("before work"))
            .unwrap();
        assert_eq!(row.count, 1);
        assert_eq!(row.notes.as_deref(), Some("before work"));
        assert_eq!(row.check_in_date, "2024-01-01");

        // Re-increment without notes keeps them.
        let row = db
            .increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), None)
            .unwrap();
        assert_eq!(row.count, 2);
        assert_eq!(row.notes.as_deref(), Some("before work"));
    }

    #[test]
    fn decrement_updates_count_and_points() {
        let db = seeded_db();
        db.increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), None).unwrap();
        db.increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), None).unwrap();

        let row = db
            .decrement_check_in(QUEST, ALICE, TASK, day("2024-01-01"))
            .unwrap()
            .expect("count 2 -> 1 keeps the row");
        assert_eq!(row.count, 1);
        assert_eq!(total_points(&db, ALICE), POINTS);
    }

    #[test]
    fn decrementing_last_count_clears_the_row() {
        let db = seeded_db();
        db.increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), None).unwrap();

        let cleared = db
            .decrement_check_in(QUEST, ALICE, TASK, day("2024-01-01"))
            .unwrap();
        assert!(cleared.is_none());
        assert_eq!(total_points(&db, ALICE), 0);

        let rows = db.checkins_for_quest_user(QUEST, ALICE, None).unwrap();
        assert!(rows.is_empty(), "count 0 rows must not exist");
    }

    #[test]
    fn over_decrement_is_rejected_and_changes_nothing() {
        let db = seeded_db();
        db.increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), None).unwrap();
        db.decrement_check_in(QUEST, ALICE, TASK, day("2024-01-01")).unwrap();

        let err = db
            .decrement_check_in(QUEST, ALICE, TASK, day("2024-01-01"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::CheckInNotFound));
        assert_eq!(total_points(&db, ALICE), 0);
    }

    #[test]
    fn point_total_is_floored_at_zero() {
        let db = seeded_db();
        db.increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), None).unwrap();

        // Simulate an externally drained total to prove the floor holds.
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE quest_participants SET total_points = 3 WHERE quest_id = ?1 AND user_id = ?2",
                params![QUEST, ALICE],
            )?;
            Ok(())
        })
        .unwrap();

        db.decrement_check_in(QUEST, ALICE, TASK, day("2024-01-01")).unwrap();
        assert_eq!(total_points(&db, ALICE), 0);
    }

    #[test]
    fn non_participant_is_rejected_without_state_change() {
        let db = seeded_db();

        let err = db
            .increment_check_in(QUEST, BOB, TASK, day("2024-01-01"), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotParticipant));

        let err = db
            .decrement_check_in(QUEST, BOB, TASK, day("2024-01-01"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotParticipant));

        let rows = db.checkins_for_quest_user(QUEST, BOB, None).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn unknown_or_foreign_task_is_rejected() {
        let db = seeded_db();

        let err = db
            .increment_check_in(QUEST, ALICE, "t-missing", day("2024-01-01"), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::TaskNotFound));

        // A real task from another quest must not resolve under this one.
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO quests (id, name, start_date, end_date, creator_id, share_code, share_code_expires_at)
                     VALUES ('q-other', 'Other', '2024-01-01', '2024-12-31', 'u-alice', '555555555', '2099-01-01T00:00:00Z');
                 INSERT INTO daily_tasks (id, quest_id, title, points) VALUES ('t-other', 'q-other', 'Stretch', 5);",
            )?;
            Ok(())
        })
        .unwrap();

        let err = db
            .increment_check_in(QUEST, ALICE, "t-other", day("2024-01-01"), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::TaskNotFound));
    }

    #[test]
    fn concurrent_increments_and_decrements_lose_no_updates() {
        let db = Arc::new(seeded_db());
        let date = day("2024-01-01");

        // Seed the cell high enough that decrements can never underflow it.
        for _ in 0..10 {
            db.increment_check_in(QUEST, ALICE, TASK, date, None).unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..3 {
            let db = db.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..4 {
                    db.increment_check_in(QUEST, ALICE, TASK, date, None).unwrap();
                }
            }));
        }
        for _ in 0..3 {
            let db = db.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..4 {
                    db.decrement_check_in(QUEST, ALICE, TASK, date).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // 10 + 12 - 12: every operation applied exactly once.
        let rows = db.checkins_for_quest_user(QUEST, ALICE, None).unwrap();
        assert_eq!(rows[0].count, 10);
        assert_eq!(total_points(&db, ALICE), 10 * POINTS);
    }

    #[test]
    fn point_total_matches_ledger_reconstruction() {
        let db = seeded_db();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_tasks (id, quest_id, title, points) VALUES ('t-2', ?1, 'Meditate', 3)",
                [QUEST],
            )?;
            Ok(())
        })
        .unwrap();

        db.increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), None).unwrap();
        db.increment_check_in(QUEST, ALICE, TASK, day("2024-01-01"), None).unwrap();
        db.increment_check_in(QUEST, ALICE, TASK, day("2024-01-02"), None).unwrap();
        db.increment_check_in(QUEST, ALICE, "t-2", day("2024-01-02"), None).unwrap();
        db.decrement_check_in(QUEST, ALICE, TASK, day("2024-01-01")).unwrap();

        let reconstructed: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COALESCE(SUM(c.count * t.points), 0)
                     FROM check_ins c JOIN daily_tasks t ON t.id = c.daily_task_id
                     WHERE c.quest_id = ?1 AND c.user_id = ?2",
                    params![QUEST, ALICE],
                    |row| row.get(0),
                )?)
            })
            .unwrap();

        assert_eq!(total_points(&db, ALICE), reconstructed);
    }
}
