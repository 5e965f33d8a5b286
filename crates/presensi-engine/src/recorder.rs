//! Recorder — the single commit path for attendance records.
//!
//! Both live ingestion and sweep reconciliation go through [`Recorder::commit`]
//! so duplicate prevention lives in exactly one place. The recorder validates
//! and classifies, but the store's insert-if-absent decides every race.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

use presensi_core::clock::Clock;
use presensi_core::error::{PresensiError, Result};
use presensi_core::traits::roster::RosterSource;
use presensi_core::traits::store::{AttendanceStore, InsertResult, NotificationQueue};
use presensi_core::types::{
    AttendanceRecord, EventType, NotificationTask, RecordSource, Status, Subject,
};

use crate::classify::classify;

/// A resolved scan from a station: badge decoding and subject resolution
/// happen upstream, the recorder only sees identifiers.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub subject_id: String,
    /// Calendar day the event belongs to (local timezone).
    pub date: NaiveDate,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    /// Manual override (`permitted`/`sick`) bypassing time-based
    /// classification. Still subject to the idempotency gate.
    pub override_status: Option<Status>,
}

/// Outcome of an ingest attempt. `AlreadyRecorded` is a defined no-op, not
/// an error: re-scans and lost insert races land here.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Created {
        record: AttendanceRecord,
        task: Option<NotificationTask>,
    },
    AlreadyRecorded(AttendanceRecord),
}

pub struct Recorder {
    store: Arc<dyn AttendanceStore>,
    queue: Arc<dyn NotificationQueue>,
    roster: Arc<dyn RosterSource>,
    clock: Arc<dyn Clock>,
    late_after: NaiveTime,
    offset: FixedOffset,
}

impl Recorder {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        queue: Arc<dyn NotificationQueue>,
        roster: Arc<dyn RosterSource>,
        clock: Arc<dyn Clock>,
        late_after: NaiveTime,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            queue,
            roster,
            clock,
            late_after,
            offset,
        }
    }

    /// Today's date in the configured local timezone.
    pub fn local_today(&self) -> NaiveDate {
        self.clock.now_local(self.offset).date_naive()
    }

    /// Ingest a live scan event.
    pub fn ingest(&self, scan: &ScanEvent) -> Result<IngestOutcome> {
        let subject = self
            .roster
            .get_subject(&scan.subject_id)?
            .ok_or_else(|| {
                PresensiError::Validation(format!("unknown subject '{}'", scan.subject_id))
            })?;
        if scan.date > self.local_today() {
            return Err(PresensiError::Validation(format!(
                "date {} is in the future",
                scan.date
            )));
        }

        // Fast no-op path for re-scans; the commit below still handles the
        // race where another station wins between this check and the insert.
        if let Some(existing) = self
            .store
            .get(&scan.subject_id, scan.date, scan.event_type)?
        {
            tracing::debug!(
                subject = %scan.subject_id,
                date = %scan.date,
                event = %scan.event_type,
                "duplicate scan ignored"
            );
            return Ok(IngestOutcome::AlreadyRecorded(existing));
        }

        let local_time = scan.occurred_at.with_timezone(&self.offset).time();
        let status = classify(
            scan.event_type,
            local_time,
            self.late_after,
            scan.override_status,
        )?;

        let record = AttendanceRecord {
            subject_id: subject.id.clone(),
            date: scan.date,
            event_type: scan.event_type,
            status,
            source: RecordSource::Live,
            recorded_at: scan.occurred_at,
            note: None,
        };
        self.commit(&subject, record)
    }

    /// Synthesize an `absent` record for a subject missing an event.
    /// Returns `Ok(None)` when a live event won the race in the interim.
    pub fn reconcile(
        &self,
        subject_id: &str,
        date: NaiveDate,
        event_type: EventType,
    ) -> Result<Option<AttendanceRecord>> {
        let subject = self.roster.get_subject(subject_id)?.ok_or_else(|| {
            PresensiError::Validation(format!("unknown subject '{subject_id}'"))
        })?;
        let record = AttendanceRecord {
            subject_id: subject.id.clone(),
            date,
            event_type,
            status: Status::Absent,
            source: RecordSource::Sweep,
            recorded_at: self.clock.now_utc(),
            note: Some(format!("missing {event_type} event")),
        };
        match self.commit(&subject, record)? {
            IngestOutcome::Created { record, .. } => Ok(Some(record)),
            IngestOutcome::AlreadyRecorded(_) => Ok(None),
        }
    }

    /// The one place records are written: atomic insert, then exactly one
    /// notification task. An enqueue failure never rolls back the record —
    /// it is logged and the commit still reports success.
    fn commit(&self, subject: &Subject, record: AttendanceRecord) -> Result<IngestOutcome> {
        match self.store.insert_if_absent(&record)? {
            InsertResult::AlreadyExists => {
                let existing = self
                    .store
                    .get(&record.subject_id, record.date, record.event_type)?
                    .ok_or_else(|| {
                        PresensiError::Store(format!(
                            "record for {}/{}/{} reported existing but not found",
                            record.subject_id, record.date, record.event_type
                        ))
                    })?;
                Ok(IngestOutcome::AlreadyRecorded(existing))
            }
            InsertResult::Created => {
                tracing::info!(
                    subject = %record.subject_id,
                    date = %record.date,
                    event = %record.event_type,
                    status = %record.status,
                    source = %record.source,
                    "📋 attendance record committed"
                );
                let task = match self.queue.enqueue(&record, &subject.notification_target) {
                    Ok(task) => task,
                    Err(e) => {
                        tracing::warn!(
                            subject = %record.subject_id,
                            "⚠️ record committed but notification enqueue failed: {e}"
                        );
                        None
                    }
                };
                Ok(IngestOutcome::Created { record, task })
            }
        }
    }
}
