//! Absence sweep — periodically backfills missing records.
//!
//! Idle → Running → Idle on a tokio interval with skip-on-miss ticks, so at
//! most one sweep runs per process and a tick that fires mid-run is dropped,
//! not queued. Concurrent sweeps across processes are fine: the store's
//! insert-if-absent turns the loser into a no-op.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use presensi_core::clock::Clock;
use presensi_core::error::Result;
use presensi_core::traits::roster::RosterSource;
use presensi_core::traits::store::{AttendanceStore, SweepCursorStore};
use presensi_core::types::EventType;

use crate::recorder::Recorder;

/// Sweep timing configuration, injected at construction.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Opens the "in" absence window once passed.
    pub late_after: NaiveTime,
    /// Opens the "out" absence window once passed.
    pub out_after: NaiveTime,
    pub interval: Duration,
    pub offset: FixedOffset,
    /// Restrict to one roster group; None sweeps everyone.
    pub roster_group: Option<String>,
}

/// What one sweep run did. Per-subject failures are collected here and
/// logged; they never abort the run.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub date: NaiveDate,
    /// Windows that were open and not already swept clean.
    pub windows: Vec<EventType>,
    pub checked: usize,
    pub reconciled: usize,
    pub failures: Vec<(String, String)>,
}

impl SweepReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            windows: Vec::new(),
            checked: 0,
            reconciled: 0,
            failures: Vec::new(),
        }
    }
}

pub struct SweepScheduler {
    recorder: Arc<Recorder>,
    store: Arc<dyn AttendanceStore>,
    roster: Arc<dyn RosterSource>,
    cursor: Arc<dyn SweepCursorStore>,
    clock: Arc<dyn Clock>,
    config: SweepConfig,
    running: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl SweepScheduler {
    pub fn new(
        recorder: Arc<Recorder>,
        store: Arc<dyn AttendanceStore>,
        roster: Arc<dyn RosterSource>,
        cursor: Arc<dyn SweepCursorStore>,
        clock: Arc<dyn Clock>,
        config: SweepConfig,
    ) -> Self {
        Self {
            recorder,
            store,
            roster,
            cursor,
            clock,
            config,
            running: Mutex::new(None),
        }
    }

    /// One full sweep pass over all currently open windows.
    pub fn run_once(&self) -> Result<SweepReport> {
        let now_local = self.clock.now_local(self.config.offset);
        let date = now_local.date_naive();
        let time_of_day = now_local.time();
        let group = self.config.roster_group.as_deref().unwrap_or("all");
        let mut report = SweepReport::new(date);

        for (event_type, cutoff) in [
            (EventType::In, self.config.late_after),
            (EventType::Out, self.config.out_after),
        ] {
            if time_of_day < cutoff {
                continue; // window not open yet
            }
            // Cursor is an optimization only; on error we just sweep again.
            let already_done = self
                .cursor
                .window_done(group, date, event_type)
                .unwrap_or(false);
            if already_done {
                continue;
            }
            report.windows.push(event_type);
            self.sweep_window(date, event_type, group, &mut report)?;
        }

        if report.failures.is_empty() {
            tracing::info!(
                date = %report.date,
                checked = report.checked,
                reconciled = report.reconciled,
                "🧹 sweep completed"
            );
        } else {
            tracing::warn!(
                date = %report.date,
                checked = report.checked,
                reconciled = report.reconciled,
                failures = report.failures.len(),
                "🧹 sweep completed with per-subject failures"
            );
            for (subject, error) in &report.failures {
                tracing::warn!(subject = %subject, "sweep reconciliation failed: {error}");
            }
        }
        Ok(report)
    }

    fn sweep_window(
        &self,
        date: NaiveDate,
        event_type: EventType,
        group: &str,
        report: &mut SweepReport,
    ) -> Result<()> {
        let subjects = self.roster.list_subjects(self.config.roster_group.as_deref())?;
        let mut clean = true;

        for subject in &subjects {
            report.checked += 1;
            match self.sweep_subject(&subject.id, date, event_type) {
                Ok(true) => report.reconciled += 1,
                Ok(false) => {}
                Err(e) => {
                    // Isolate this subject; keep going.
                    clean = false;
                    report.failures.push((subject.id.clone(), e.to_string()));
                }
            }
        }

        // Only a clean pass advances the cursor, so failed subjects get
        // retried on the next tick.
        if clean {
            if let Err(e) = self.cursor.mark_window_done(group, date, event_type) {
                tracing::debug!("sweep cursor update failed (will re-enumerate): {e}");
            }
        }
        Ok(())
    }

    /// Returns true if an absent record was synthesized for this subject.
    fn sweep_subject(
        &self,
        subject_id: &str,
        date: NaiveDate,
        event_type: EventType,
    ) -> Result<bool> {
        if self.store.get(subject_id, date, event_type)?.is_some() {
            return Ok(false);
        }
        Ok(self
            .recorder
            .reconcile(subject_id, date, event_type)?
            .is_some())
    }

    /// Start the periodic sweep loop. Idempotent: a second call while
    /// running is a warning, not a second loop.
    pub fn start(self: &Arc<Self>) {
        let mut guard = self.running.lock().unwrap();
        if guard.is_some() {
            tracing::warn!("sweep scheduler already running");
            return;
        }
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let interval = self.config.interval;
        let handle = tokio::spawn(async move {
            tracing::info!("⏰ sweep scheduler started (every {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            // A tick that fires while a run is still in progress is dropped.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.run_once() {
                            tracing::warn!("⚠️ sweep run failed: {e}");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("sweep scheduler stopped");
                        break;
                    }
                }
            }
        });
        *guard = Some((shutdown_tx, handle));
    }

    /// Stop the loop and wait for any in-progress run to finish. Records
    /// already reconciled stay committed; remaining subjects are simply
    /// picked up by the next start.
    pub async fn stop(&self) {
        let taken = self.running.lock().unwrap().take();
        if let Some((shutdown_tx, handle)) = taken {
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
        }
    }
}
