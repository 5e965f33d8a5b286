//! # Presensi Engine
//!
//! The attendance reconciliation and notification engine.
//!
//! ## Architecture
//! ```text
//! Scanner ──▶ Recorder::ingest ──▶ classify ──▶ AttendanceStore (insert-if-absent)
//!                                                  │ Created
//!                                                  ▼
//! SweepScheduler (tokio interval)            NotificationQueue
//!   ├── "in" window  (after late_after)            │
//!   └── "out" window (after out_after)             ▼
//!         └──▶ Recorder::reconcile           Dispatcher (worker)
//!               (same commit path)                 └──▶ NotificationChannel
//! ```
//!
//! Correctness rests on one contract: the store's atomic insert-if-absent.
//! Live scans, sweep backfills, process restarts, and concurrent deployments
//! all funnel through it, so duplicates are impossible by construction and
//! everything else (cursor, dispatcher, retries) is free to be best-effort.

pub mod classify;
pub mod dispatch;
pub mod recorder;
pub mod sweep;

pub use classify::classify;
pub use dispatch::{Dispatcher, DispatcherConfig};
pub use recorder::{IngestOutcome, Recorder, ScanEvent};
pub use sweep::{SweepConfig, SweepReport, SweepScheduler};
