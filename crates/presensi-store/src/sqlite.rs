//! SQLite-backed attendance store.
//!
//! One connection behind a mutex, `execute_batch` migrations, and
//! `INSERT OR IGNORE` against the composite primary key for the atomic
//! insert-if-absent. Busy/locked failures map to `StoreUnavailable` so a
//! scanning station sees a retryable error instead of a hang.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};

use presensi_core::error::{PresensiError, Result};
use presensi_core::traits::store::{
    AttendanceStore, InsertResult, NotificationQueue, SweepCursorStore,
};
use presensi_core::traits::roster::RosterSource;
use presensi_core::types::{
    AttendanceRecord, EventType, NotificationTask, RecordSource, Status, Subject, TaskStatus,
};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the attendance database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(store_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by this crate's own tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            -- One row per (subject, day, event); the primary key IS the
            -- idempotency gate.
            CREATE TABLE IF NOT EXISTS attendance (
                subject_id  TEXT NOT NULL,
                date        TEXT NOT NULL,
                event_type  TEXT NOT NULL,      -- 'in' | 'out'
                status      TEXT NOT NULL,      -- present/late/permitted/sick/absent
                source      TEXT NOT NULL,      -- 'live' | 'sweep'
                recorded_at TEXT NOT NULL,
                note        TEXT,
                PRIMARY KEY (subject_id, date, event_type)
            );

            -- One task per record key; retries mutate attempts/status.
            CREATE TABLE IF NOT EXISTS notification_tasks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id  TEXT NOT NULL,
                date        TEXT NOT NULL,
                event_type  TEXT NOT NULL,
                target      TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                attempts    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                sent_at     TEXT,
                UNIQUE (subject_id, date, event_type)
            );

            CREATE TABLE IF NOT EXISTS subjects (
                id                  TEXT PRIMARY KEY,
                display_name        TEXT NOT NULL,
                external_id         TEXT NOT NULL DEFAULT '',
                roster_group        TEXT NOT NULL DEFAULT 'default',
                notification_target TEXT NOT NULL DEFAULT ''
            );

            -- Sweep progress marker (optimization only; safe to drop).
            CREATE TABLE IF NOT EXISTS sweep_cursor (
                roster_group TEXT NOT NULL,
                date         TEXT NOT NULL,
                event_type   TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (roster_group, date, event_type)
            );
            ",
        )
        .map_err(|e| PresensiError::Store(format!("migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PresensiError::Store(format!("store lock poisoned: {e}")))
    }

    /// Insert or update a subject. Roster management is external to the
    /// engine; this exists for the `roster` CLI and tests.
    pub fn upsert_subject(&self, subject: &Subject) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO subjects
             (id, display_name, external_id, roster_group, notification_target)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                subject.id,
                subject.display_name,
                subject.external_id,
                subject.roster_group,
                subject.notification_target,
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }
}

/// Map a rusqlite error onto the taxonomy: busy/locked is transient
/// (`StoreUnavailable`), everything else is a hard store error.
fn store_err(e: rusqlite::Error) -> PresensiError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::DatabaseBusy
                || f.code == rusqlite::ErrorCode::DatabaseLocked =>
        {
            PresensiError::StoreUnavailable(e.to_string())
        }
        _ => PresensiError::Store(e.to_string()),
    }
}

fn bad_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| bad_column(idx, format!("bad date '{s}': {e}")))
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| bad_column(idx, format!("bad timestamp '{s}': {e}")))
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let date: String = row.get(1)?;
    let event: String = row.get(2)?;
    let status: String = row.get(3)?;
    let source: String = row.get(4)?;
    let recorded_at: String = row.get(5)?;
    Ok(AttendanceRecord {
        subject_id: row.get(0)?,
        date: parse_date(1, &date)?,
        event_type: EventType::parse(&event).map_err(|e| bad_column(2, e.to_string()))?,
        status: Status::parse(&status).map_err(|e| bad_column(3, e.to_string()))?,
        source: RecordSource::parse(&source).map_err(|e| bad_column(4, e.to_string()))?,
        recorded_at: parse_timestamp(5, &recorded_at)?,
        note: row.get(6)?,
    })
}

const RECORD_COLS: &str = "subject_id, date, event_type, status, source, recorded_at, note";

impl AttendanceStore for SqliteStore {
    fn get(
        &self,
        subject_id: &str,
        date: NaiveDate,
        event_type: EventType,
    ) -> Result<Option<AttendanceRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {RECORD_COLS} FROM attendance
                 WHERE subject_id = ?1 AND date = ?2 AND event_type = ?3"
            ),
            rusqlite::params![subject_id, date.to_string(), event_type.as_str()],
            record_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<InsertResult> {
        let conn = self.lock()?;
        // The primary key decides the race; a concurrent winner makes this a
        // zero-row change, not an error.
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO attendance
                 (subject_id, date, event_type, status, source, recorded_at, note)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    record.subject_id,
                    record.date.to_string(),
                    record.event_type.as_str(),
                    record.status.as_str(),
                    record.source.as_str(),
                    record.recorded_at.to_rfc3339(),
                    record.note,
                ],
            )
            .map_err(store_err)?;
        Ok(if changed == 1 {
            InsertResult::Created
        } else {
            InsertResult::AlreadyExists
        })
    }

    fn recent(&self, limit: usize) -> Result<Vec<AttendanceRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLS} FROM attendance
                 ORDER BY recorded_at DESC LIMIT ?1"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map([limit as i64], record_from_row)
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationTask> {
    let date: String = row.get(2)?;
    let event: String = row.get(3)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    let sent_at: Option<String> = row.get(8)?;
    Ok(NotificationTask {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        date: parse_date(2, &date)?,
        event_type: EventType::parse(&event).map_err(|e| bad_column(3, e.to_string()))?,
        target: row.get(4)?,
        status: TaskStatus::parse(&status).map_err(|e| bad_column(5, e.to_string()))?,
        attempts: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
        sent_at: match sent_at {
            Some(s) => Some(parse_timestamp(8, &s)?),
            None => None,
        },
    })
}

const TASK_COLS: &str =
    "id, subject_id, date, event_type, target, status, attempts, created_at, sent_at";

impl NotificationQueue for SqliteStore {
    fn enqueue(&self, record: &AttendanceRecord, target: &str) -> Result<Option<NotificationTask>> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO notification_tasks
                 (subject_id, date, event_type, target, status, attempts, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5)",
                rusqlite::params![
                    record.subject_id,
                    record.date.to_string(),
                    record.event_type.as_str(),
                    target,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(store_err)?;
        if changed == 0 {
            return Ok(None);
        }
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {TASK_COLS} FROM notification_tasks WHERE id = ?1"),
            [id],
            task_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    fn pending(&self, limit: usize) -> Result<Vec<NotificationTask>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TASK_COLS} FROM notification_tasks
                 WHERE status = 'pending' ORDER BY id LIMIT ?1"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map([limit as i64], task_from_row)
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    fn update_status(&self, id: i64, status: TaskStatus, attempts: u32) -> Result<()> {
        let conn = self.lock()?;
        let sent_at = match status {
            TaskStatus::Sent => Some(Utc::now().to_rfc3339()),
            _ => None,
        };
        conn.execute(
            "UPDATE notification_tasks
             SET status = ?1, attempts = ?2, sent_at = COALESCE(?3, sent_at)
             WHERE id = ?4",
            rusqlite::params![status.as_str(), attempts, sent_at, id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn task_for(
        &self,
        subject_id: &str,
        date: NaiveDate,
        event_type: EventType,
    ) -> Result<Option<NotificationTask>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {TASK_COLS} FROM notification_tasks
                 WHERE subject_id = ?1 AND date = ?2 AND event_type = ?3"
            ),
            rusqlite::params![subject_id, date.to_string(), event_type.as_str()],
            task_from_row,
        )
        .optional()
        .map_err(store_err)
    }
}

fn subject_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        display_name: row.get(1)?,
        external_id: row.get(2)?,
        roster_group: row.get(3)?,
        notification_target: row.get(4)?,
    })
}

impl RosterSource for SqliteStore {
    fn get_subject(&self, id: &str) -> Result<Option<Subject>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, display_name, external_id, roster_group, notification_target
             FROM subjects WHERE id = ?1",
            [id],
            subject_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    fn list_subjects(&self, group: Option<&str>) -> Result<Vec<Subject>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, display_name, external_id, roster_group, notification_target
                 FROM subjects
                 WHERE ?1 IS NULL OR roster_group = ?1
                 ORDER BY id",
            )
            .map_err(store_err)?;
        let rows = stmt.query_map([group], subject_from_row).map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }
}

impl SweepCursorStore for SqliteStore {
    fn window_done(&self, group: &str, date: NaiveDate, event_type: EventType) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sweep_cursor
                 WHERE roster_group = ?1 AND date = ?2 AND event_type = ?3",
                rusqlite::params![group, date.to_string(), event_type.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        Ok(found.is_some())
    }

    fn mark_window_done(&self, group: &str, date: NaiveDate, event_type: EventType) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO sweep_cursor (roster_group, date, event_type, completed_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                group,
                date.to_string(),
                event_type.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(subject: &str, event: EventType) -> AttendanceRecord {
        AttendanceRecord {
            subject_id: subject.into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            event_type: event,
            status: Status::Present,
            source: RecordSource::Live,
            recorded_at: Utc::now(),
            note: None,
        }
    }

    #[test]
    fn test_insert_if_absent_wins_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = sample_record("s-1", EventType::In);

        assert_eq!(
            store.insert_if_absent(&record).unwrap(),
            InsertResult::Created
        );
        // Second identical insert is a no-op, even with a different status.
        let mut dup = sample_record("s-1", EventType::In);
        dup.status = Status::Late;
        assert_eq!(
            store.insert_if_absent(&dup).unwrap(),
            InsertResult::AlreadyExists
        );

        let stored = store
            .get("s-1", record.date, EventType::In)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, Status::Present);
    }

    #[test]
    fn test_in_and_out_are_independent_keys() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(
            store
                .insert_if_absent(&sample_record("s-1", EventType::In))
                .unwrap(),
            InsertResult::Created
        );
        assert_eq!(
            store
                .insert_if_absent(&sample_record("s-1", EventType::Out))
                .unwrap(),
            InsertResult::Created
        );
    }

    #[test]
    fn test_enqueue_never_duplicates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = sample_record("s-1", EventType::In);
        store.insert_if_absent(&record).unwrap();

        let task = store.enqueue(&record, "chat-42").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);

        // Retried commit: no second task.
        assert!(store.enqueue(&record, "chat-42").unwrap().is_none());
        assert_eq!(store.pending(10).unwrap().len(), 1);
    }

    #[test]
    fn test_task_status_updates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = sample_record("s-1", EventType::Out);
        store.insert_if_absent(&record).unwrap();
        let task = store.enqueue(&record, "chat-42").unwrap().unwrap();

        store
            .update_status(task.id, TaskStatus::Sent, 1)
            .unwrap();
        let reloaded = store
            .task_for("s-1", record.date, EventType::Out)
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, TaskStatus::Sent);
        assert_eq!(reloaded.attempts, 1);
        assert!(reloaded.sent_at.is_some());
        assert!(store.pending(10).unwrap().is_empty());
    }

    #[test]
    fn test_roster_group_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, group) in [("a", "7A"), ("b", "7A"), ("c", "7B")] {
            store
                .upsert_subject(&Subject {
                    id: id.into(),
                    display_name: id.to_uppercase(),
                    external_id: format!("nisn-{id}"),
                    roster_group: group.into(),
                    notification_target: String::new(),
                })
                .unwrap();
        }
        assert_eq!(store.list_subjects(None).unwrap().len(), 3);
        assert_eq!(store.list_subjects(Some("7A")).unwrap().len(), 2);
        assert!(store.get_subject("a").unwrap().is_some());
        assert!(store.get_subject("zz").unwrap().is_none());
    }

    #[test]
    fn test_sweep_cursor() {
        let store = SqliteStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(!store.window_done("all", date, EventType::In).unwrap());
        store.mark_window_done("all", date, EventType::In).unwrap();
        assert!(store.window_done("all", date, EventType::In).unwrap());
        // Marking twice is fine.
        store.mark_window_done("all", date, EventType::In).unwrap();
        assert!(!store.window_done("all", date, EventType::Out).unwrap());
    }

    #[test]
    fn test_locked_database_is_store_unavailable() {
        let dir = std::env::temp_dir().join("presensi-store-locked-test");
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("locked.db");
        let store = SqliteStore::open(&path).unwrap();
        // Shrink the busy timeout so the test does not wait out the default.
        store
            .lock()
            .unwrap()
            .busy_timeout(Duration::from_millis(20))
            .unwrap();

        // A second connection holding an exclusive write transaction makes
        // the store's writes fail busy, which must surface as the retryable
        // variant, not a hard store error.
        let writer = Connection::open(&path).unwrap();
        writer.execute_batch("BEGIN EXCLUSIVE").unwrap();
        let err = store
            .insert_if_absent(&sample_record("s-1", EventType::In))
            .unwrap_err();
        assert!(matches!(err, PresensiError::StoreUnavailable(_)));

        // Once the lock is released the same insert goes through.
        writer.execute_batch("COMMIT").unwrap();
        assert_eq!(
            store
                .insert_if_absent(&sample_record("s-1", EventType::In))
                .unwrap(),
            InsertResult::Created
        );

        drop(writer);
        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = std::env::temp_dir().join("presensi-store-test");
        std::fs::remove_dir_all(&dir).ok();
        let store = SqliteStore::open(&dir.join("nested").join("test.db")).unwrap();
        assert!(store.recent(5).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
