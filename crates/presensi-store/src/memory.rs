//! In-memory store backend.
//!
//! Same contracts as the SQLite backend with the atomicity provided by a
//! single mutex: the existence check and the insert happen under one lock,
//! so concurrent identical commits still produce exactly one record. Used by
//! the engine's unit tests; also handy for demos without a database file.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};

use presensi_core::error::{PresensiError, Result};
use presensi_core::traits::roster::RosterSource;
use presensi_core::traits::store::{
    AttendanceStore, InsertResult, NotificationQueue, SweepCursorStore,
};
use presensi_core::types::{
    AttendanceRecord, EventType, NotificationTask, Subject, TaskStatus,
};

type RecordKey = (String, NaiveDate, EventType);

#[derive(Default)]
struct Inner {
    records: HashMap<RecordKey, AttendanceRecord>,
    tasks: Vec<NotificationTask>,
    subjects: BTreeMap<String, Subject>,
    cursors: HashSet<(String, NaiveDate, EventType)>,
    next_task_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| PresensiError::Store(format!("store lock poisoned: {e}")))
    }

    pub fn upsert_subject(&self, subject: &Subject) -> Result<()> {
        let mut inner = self.lock()?;
        inner.subjects.insert(subject.id.clone(), subject.clone());
        Ok(())
    }

    /// All tasks regardless of status (test inspection).
    pub fn all_tasks(&self) -> Result<Vec<NotificationTask>> {
        Ok(self.lock()?.tasks.clone())
    }
}

impl AttendanceStore for MemoryStore {
    fn get(
        &self,
        subject_id: &str,
        date: NaiveDate,
        event_type: EventType,
    ) -> Result<Option<AttendanceRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .get(&(subject_id.to_string(), date, event_type))
            .cloned())
    }

    fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<InsertResult> {
        let mut inner = self.lock()?;
        let key = (record.subject_id.clone(), record.date, record.event_type);
        if inner.records.contains_key(&key) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.records.insert(key, record.clone());
        Ok(InsertResult::Created)
    }

    fn recent(&self, limit: usize) -> Result<Vec<AttendanceRecord>> {
        let inner = self.lock()?;
        let mut records: Vec<_> = inner.records.values().cloned().collect();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        records.truncate(limit);
        Ok(records)
    }
}

impl NotificationQueue for MemoryStore {
    fn enqueue(&self, record: &AttendanceRecord, target: &str) -> Result<Option<NotificationTask>> {
        let mut inner = self.lock()?;
        let exists = inner.tasks.iter().any(|t| {
            t.subject_id == record.subject_id
                && t.date == record.date
                && t.event_type == record.event_type
        });
        if exists {
            return Ok(None);
        }
        inner.next_task_id += 1;
        let task = NotificationTask {
            id: inner.next_task_id,
            subject_id: record.subject_id.clone(),
            date: record.date,
            event_type: record.event_type,
            target: target.to_string(),
            status: TaskStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            sent_at: None,
        };
        inner.tasks.push(task.clone());
        Ok(Some(task))
    }

    fn pending(&self, limit: usize) -> Result<Vec<NotificationTask>> {
        let inner = self.lock()?;
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_status(&self, id: i64, status: TaskStatus, attempts: u32) -> Result<()> {
        let mut inner = self.lock()?;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| PresensiError::Store(format!("no notification task with id {id}")))?;
        task.status = status;
        task.attempts = attempts;
        if status == TaskStatus::Sent {
            task.sent_at = Some(Utc::now());
        }
        Ok(())
    }

    fn task_for(
        &self,
        subject_id: &str,
        date: NaiveDate,
        event_type: EventType,
    ) -> Result<Option<NotificationTask>> {
        let inner = self.lock()?;
        Ok(inner
            .tasks
            .iter()
            .find(|t| {
                t.subject_id == subject_id && t.date == date && t.event_type == event_type
            })
            .cloned())
    }
}

impl RosterSource for MemoryStore {
    fn get_subject(&self, id: &str) -> Result<Option<Subject>> {
        Ok(self.lock()?.subjects.get(id).cloned())
    }

    fn list_subjects(&self, group: Option<&str>) -> Result<Vec<Subject>> {
        let inner = self.lock()?;
        Ok(inner
            .subjects
            .values()
            .filter(|s| group.is_none_or(|g| s.roster_group == g))
            .cloned()
            .collect())
    }
}

impl SweepCursorStore for MemoryStore {
    fn window_done(&self, group: &str, date: NaiveDate, event_type: EventType) -> Result<bool> {
        let inner = self.lock()?;
        Ok(inner.cursors.contains(&(group.to_string(), date, event_type)))
    }

    fn mark_window_done(&self, group: &str, date: NaiveDate, event_type: EventType) -> Result<()> {
        let mut inner = self.lock()?;
        inner.cursors.insert((group.to_string(), date, event_type));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presensi_core::types::{RecordSource, Status};

    fn sample_record(subject: &str) -> AttendanceRecord {
        AttendanceRecord {
            subject_id: subject.into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            event_type: EventType::In,
            status: Status::Present,
            source: RecordSource::Live,
            recorded_at: Utc::now(),
            note: None,
        }
    }

    #[test]
    fn test_insert_if_absent() {
        let store = MemoryStore::new();
        let record = sample_record("s-1");
        assert_eq!(
            store.insert_if_absent(&record).unwrap(),
            InsertResult::Created
        );
        assert_eq!(
            store.insert_if_absent(&record).unwrap(),
            InsertResult::AlreadyExists
        );
        assert!(store
            .get("s-1", record.date, EventType::In)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_enqueue_once_per_key() {
        let store = MemoryStore::new();
        let record = sample_record("s-1");
        assert!(store.enqueue(&record, "t").unwrap().is_some());
        assert!(store.enqueue(&record, "t").unwrap().is_none());
        assert_eq!(store.all_tasks().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_insert_single_winner() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.insert_if_absent(&sample_record("s-1")).unwrap()
            }));
        }
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| *r == InsertResult::Created)
            .count();
        assert_eq!(created, 1);
    }
}
