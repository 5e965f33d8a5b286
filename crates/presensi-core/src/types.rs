//! Domain types — the core data model for attendance tracking.
//!
//! Statuses are a closed enum; the legacy Indonesian vocabulary
//! (`hadir`/`sakit`/`izin`/`alpha`) is accepted only through
//! [`Status::normalize`] at the system boundary and never leaks into core
//! logic or storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PresensiError, Result};

/// A check-in or check-out event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    In,
    Out,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::In => "in",
            EventType::Out => "out",
        }
    }

    /// Parse an event type, accepting the legacy scanner words as well.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "in" | "masuk" => Ok(EventType::In),
            "out" | "pulang" => Ok(EventType::Out),
            other => Err(PresensiError::Validation(format!(
                "unknown event type '{other}' (expected 'in' or 'out')"
            ))),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attendance status derived for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Late,
    Permitted,
    Sick,
    Absent,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Late => "late",
            Status::Permitted => "permitted",
            Status::Sick => "sick",
            Status::Absent => "absent",
        }
    }

    /// Parse a canonical status string (the only form the store holds).
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Status::Present),
            "late" => Ok(Status::Late),
            "permitted" => Ok(Status::Permitted),
            "sick" => Ok(Status::Sick),
            "absent" => Ok(Status::Absent),
            other => Err(PresensiError::Validation(format!(
                "unknown status '{other}'"
            ))),
        }
    }

    /// Boundary normalization: accepts both the canonical vocabulary and the
    /// legacy Indonesian one still used by older scanning clients.
    pub fn normalize(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hadir" => Ok(Status::Present),
            "terlambat" => Ok(Status::Late),
            "izin" => Ok(Status::Permitted),
            "sakit" => Ok(Status::Sick),
            "alpha" | "alpa" => Ok(Status::Absent),
            canonical => Status::parse(canonical),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record came from: a live scan or the absence sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Live,
    Sweep,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Live => "live",
            RecordSource::Sweep => "sweep",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "live" => Ok(RecordSource::Live),
            "sweep" => Ok(RecordSource::Sweep),
            other => Err(PresensiError::Validation(format!(
                "unknown record source '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person whose attendance is tracked. Managed by an external roster
/// process; read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    /// Stable internal identifier (what the scanner resolves badges to).
    pub id: String,
    pub display_name: String,
    /// Badge / NISN-equivalent external identifier.
    pub external_id: String,
    pub roster_group: String,
    /// Opaque address the notification channel delivers to
    /// (e.g. a Telegram chat id). Empty means "no notifications".
    pub notification_target: String,
}

/// The atomic fact being protected: at most one record ever exists per
/// `(subject_id, date, event_type)`. Append-only — corrections are modeled
/// as separate audit entries, never as in-place edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub subject_id: String,
    /// Calendar day in the configured local timezone.
    pub date: NaiveDate,
    pub event_type: EventType,
    pub status: Status,
    pub source: RecordSource,
    pub recorded_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Delivery state of a notification task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Sent,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Sent => "sent",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "sent" => Ok(TaskStatus::Sent),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(PresensiError::Validation(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-to-one companion of an [`AttendanceRecord`]: created once per record
/// key, never duplicated. Delivery retries mutate `attempts`/`status` on
/// the same task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTask {
    pub id: i64,
    pub subject_id: String,
    pub date: NaiveDate,
    pub event_type: EventType,
    pub target: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}
