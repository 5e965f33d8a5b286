//! Attendance store contracts.
//!
//! `insert_if_absent` is the single most important contract in the system:
//! the store, not application code, decides the winner when identical events
//! race. Implementations must make the existence check and the write one
//! atomic operation (a unique-constrained insert), never a read followed by
//! a separate write.

use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{AttendanceRecord, EventType, NotificationTask, TaskStatus};

/// Outcome of an atomic conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Created,
    AlreadyExists,
}

/// Durable keyed storage for attendance records.
pub trait AttendanceStore: Send + Sync {
    fn get(
        &self,
        subject_id: &str,
        date: NaiveDate,
        event_type: EventType,
    ) -> Result<Option<AttendanceRecord>>;

    /// Insert the record unless one already exists for its
    /// `(subject_id, date, event_type)` key.
    fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<InsertResult>;

    /// Most recently recorded records, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<AttendanceRecord>>;
}

/// Persistent queue of notification tasks, one per committed record.
pub trait NotificationQueue: Send + Sync {
    /// Create the companion task for a freshly committed record. Returns
    /// `None` if a task for that record key already exists — retried commits
    /// never duplicate tasks.
    fn enqueue(&self, record: &AttendanceRecord, target: &str) -> Result<Option<NotificationTask>>;

    /// Oldest pending tasks, up to `limit`.
    fn pending(&self, limit: usize) -> Result<Vec<NotificationTask>>;

    fn update_status(&self, id: i64, status: TaskStatus, attempts: u32) -> Result<()>;

    fn task_for(
        &self,
        subject_id: &str,
        date: NaiveDate,
        event_type: EventType,
    ) -> Result<Option<NotificationTask>>;
}

/// Sweep progress marker. Purely an optimization to skip re-enumerating a
/// window that already completed cleanly — losing or resetting it violates
/// nothing, because record uniqueness is enforced by the store itself.
pub trait SweepCursorStore: Send + Sync {
    fn window_done(&self, group: &str, date: NaiveDate, event_type: EventType) -> Result<bool>;

    fn mark_window_done(&self, group: &str, date: NaiveDate, event_type: EventType) -> Result<()>;
}
