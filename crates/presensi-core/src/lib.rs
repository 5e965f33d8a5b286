//! # Presensi Core
//!
//! Shared foundation for the attendance engine: the closed domain types
//! (subjects, attendance records, notification tasks), the error taxonomy,
//! the configuration system, and the traits that the engine uses to talk to
//! its collaborators (attendance store, roster source, notification channel,
//! clock).
//!
//! The engine never talks to a concrete database or messaging API directly —
//! everything behind a seam lives in `traits`.

pub mod clock;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PresensiConfig;
pub use error::{PresensiError, Result};
pub use types::{
    AttendanceRecord, EventType, NotificationTask, RecordSource, Status, Subject, TaskStatus,
};
