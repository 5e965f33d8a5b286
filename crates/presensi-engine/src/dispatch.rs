//! Notification dispatcher — delivers queued tasks, decoupled from commits.
//!
//! Runs as its own worker so channel latency or outages never block record
//! creation. Delivery is bounded best-effort: at most `max_attempts` tries
//! (default 2, i.e. one immediate retry), then the task is marked failed and
//! left alone. Failure lives entirely in the task row; it can never reach
//! back into the attendance store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::FixedOffset;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use presensi_core::error::Result;
use presensi_core::traits::channel::NotificationChannel;
use presensi_core::traits::roster::RosterSource;
use presensi_core::traits::store::{AttendanceStore, NotificationQueue};
use presensi_core::types::{AttendanceRecord, NotificationTask, Status, TaskStatus};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Total delivery attempts per task (2 = one immediate retry).
    pub max_attempts: u32,
    pub poll_interval: Duration,
    /// Local offset used only for formatting times in messages.
    pub offset: FixedOffset,
}

pub struct Dispatcher {
    queue: Arc<dyn NotificationQueue>,
    store: Arc<dyn AttendanceStore>,
    roster: Arc<dyn RosterSource>,
    channel: Arc<dyn NotificationChannel>,
    config: DispatcherConfig,
    running: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        store: Arc<dyn AttendanceStore>,
        roster: Arc<dyn RosterSource>,
        channel: Arc<dyn NotificationChannel>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            store,
            roster,
            channel,
            config,
            running: Mutex::new(None),
        }
    }

    /// Process every currently pending task once. Returns how many were
    /// delivered. Per-task failures are absorbed into the task status.
    pub async fn drain_once(&self) -> Result<usize> {
        let tasks = self.queue.pending(64)?;
        let mut delivered = 0;
        for task in &tasks {
            match self.deliver(task).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => {
                    // Bookkeeping failure, not a delivery failure; the task
                    // stays pending and is retried on the next poll.
                    tracing::warn!(task = task.id, "dispatcher bookkeeping error: {e}");
                }
            }
        }
        Ok(delivered)
    }

    /// Deliver one task. Returns whether the message went out.
    async fn deliver(&self, task: &NotificationTask) -> Result<bool> {
        // Permanent failure: nowhere to send. No retry.
        if task.target.trim().is_empty() {
            tracing::debug!(task = task.id, subject = %task.subject_id, "no notification target");
            self.queue
                .update_status(task.id, TaskStatus::Failed, task.attempts)?;
            return Ok(false);
        }

        let message = match self.render(task)? {
            Some(message) => message,
            None => {
                // Record vanished from under the task; nothing to say.
                self.queue
                    .update_status(task.id, TaskStatus::Failed, task.attempts)?;
                return Ok(false);
            }
        };

        let mut attempts = task.attempts;
        while attempts < self.config.max_attempts {
            attempts += 1;
            match self.channel.send(&task.target, &message).await {
                Ok(()) => {
                    self.queue
                        .update_status(task.id, TaskStatus::Sent, attempts)?;
                    tracing::info!(
                        task = task.id,
                        subject = %task.subject_id,
                        channel = self.channel.name(),
                        "📣 notification sent"
                    );
                    return Ok(true);
                }
                Err(e) => {
                    tracing::warn!(
                        task = task.id,
                        attempt = attempts,
                        "⚠️ notification delivery failed: {e}"
                    );
                }
            }
        }
        self.queue
            .update_status(task.id, TaskStatus::Failed, attempts)?;
        Ok(false)
    }

    /// Build the outbound message for a task from its record and subject.
    fn render(&self, task: &NotificationTask) -> Result<Option<String>> {
        let record = match self
            .store
            .get(&task.subject_id, task.date, task.event_type)?
        {
            Some(record) => record,
            None => return Ok(None),
        };
        let name = self
            .roster
            .get_subject(&task.subject_id)?
            .map(|s| s.display_name)
            .unwrap_or_else(|| task.subject_id.clone());
        Ok(Some(render_message(&record, &name, self.config.offset)))
    }

    /// Start the polling worker loop.
    pub fn start(self: &Arc<Self>) {
        let mut guard = self.running.lock().unwrap();
        if guard.is_some() {
            tracing::warn!("dispatcher already running");
            return;
        }
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let dispatcher = Arc::clone(self);
        let poll = self.config.poll_interval;
        let handle = tokio::spawn(async move {
            tracing::info!(
                "📮 notification dispatcher started ({}, poll every {:?})",
                dispatcher.channel.name(),
                poll
            );
            let mut ticker = tokio::time::interval(poll);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = dispatcher.drain_once().await {
                            tracing::warn!("⚠️ dispatcher poll failed: {e}");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("notification dispatcher stopped");
                        break;
                    }
                }
            }
        });
        *guard = Some((shutdown_tx, handle));
    }

    /// Stop the worker. In-flight sends are allowed to finish; anything
    /// still pending is picked up on the next start — committed records are
    /// never affected.
    pub async fn stop(&self) {
        let taken = self.running.lock().unwrap().take();
        if let Some((shutdown_tx, handle)) = taken {
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
        }
    }
}

/// Human-readable message for one committed record.
fn render_message(record: &AttendanceRecord, display_name: &str, offset: FixedOffset) -> String {
    let emoji = match record.status {
        Status::Present => "✅",
        Status::Late => "⏰",
        Status::Permitted => "📝",
        Status::Sick => "🤒",
        Status::Absent => "❌",
    };
    let local_time = record
        .recorded_at
        .with_timezone(&offset)
        .format("%H:%M");
    let mut message = format!(
        "{emoji} {display_name}: {} {} on {} at {local_time}",
        record.event_type, record.status, record.date
    );
    if let Some(note) = &record.note {
        message.push_str(&format!(" ({note})"));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use presensi_core::clock::FixedClock;
    use presensi_core::error::PresensiError;
    use presensi_core::types::{EventType, RecordSource, Subject};
    use presensi_store::MemoryStore;

    use crate::recorder::{Recorder, ScanEvent};

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn local(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        offset()
            .with_ymd_and_hms(2026, 3, 2, h, mi, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Channel that records sends and fails a configurable number of times.
    struct MockChannel {
        sent: Mutex<Vec<(String, String)>>,
        failures_remaining: AtomicUsize,
    }

    impl MockChannel {
        fn reliable() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failures_remaining: AtomicUsize::new(0),
            }
        }

        fn failing(times: usize) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failures_remaining: AtomicUsize::new(times),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationChannel for MockChannel {
        fn name(&self) -> &str {
            "mock"
        }

        async fn send(&self, target: &str, message: &str) -> presensi_core::error::Result<()> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(PresensiError::Channel("gateway timeout".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn setup(channel: Arc<MockChannel>, target: &str) -> (Arc<MemoryStore>, Recorder, Dispatcher) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_subject(&Subject {
                id: "s-1".into(),
                display_name: "Ani".into(),
                external_id: "nisn-001".into(),
                roster_group: "7A".into(),
                notification_target: target.into(),
            })
            .unwrap();
        let clock = Arc::new(FixedClock::at(local(7, 10, 0)));
        let recorder = Recorder::new(
            store.clone(),
            store.clone(),
            store.clone(),
            clock,
            NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            offset(),
        );
        let dispatcher = Dispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            channel,
            DispatcherConfig {
                max_attempts: 2,
                poll_interval: Duration::from_millis(10),
                offset: offset(),
            },
        );
        (store, recorder, dispatcher)
    }

    fn checkin(recorder: &Recorder) {
        recorder
            .ingest(&ScanEvent {
                subject_id: "s-1".into(),
                date: local(7, 10, 0).with_timezone(&offset()).date_naive(),
                event_type: EventType::In,
                occurred_at: local(7, 10, 0),
                override_status: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_delivery_marks_sent() {
        let channel = Arc::new(MockChannel::reliable());
        let (store, recorder, dispatcher) = setup(channel.clone(), "chat-1");
        checkin(&recorder);

        assert_eq!(dispatcher.drain_once().await.unwrap(), 1);

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "chat-1");
        assert!(sent[0].1.contains("Ani"));
        assert!(sent[0].1.contains("present"));

        let task = &store.all_tasks().unwrap()[0];
        assert_eq!(task.status, TaskStatus::Sent);
        assert_eq!(task.attempts, 1);
        assert!(task.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_one_immediate_retry_then_success() {
        let channel = Arc::new(MockChannel::failing(1));
        let (store, recorder, dispatcher) = setup(channel.clone(), "chat-1");
        checkin(&recorder);

        assert_eq!(dispatcher.drain_once().await.unwrap(), 1);
        assert_eq!(channel.sent().len(), 1);
        let task = &store.all_tasks().unwrap()[0];
        assert_eq!(task.status, TaskStatus::Sent);
        assert_eq!(task.attempts, 2);
    }

    #[tokio::test]
    async fn test_channel_outage_confined_to_task() {
        // Channel fails every call; the record must stay committed.
        let channel = Arc::new(MockChannel::failing(usize::MAX));
        let (store, recorder, dispatcher) = setup(channel.clone(), "chat-1");
        checkin(&recorder);

        assert_eq!(dispatcher.drain_once().await.unwrap(), 0);

        let task = &store.all_tasks().unwrap()[0];
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 2); // bounded: initial try + one retry
        assert!(channel.sent().is_empty());

        // Record untouched and queryable.
        let date = local(7, 10, 0).with_timezone(&offset()).date_naive();
        let record = store.get("s-1", date, EventType::In).unwrap().unwrap();
        assert_eq!(record.source, RecordSource::Live);

        // A later drain does not resurrect the failed task.
        assert_eq!(dispatcher.drain_once().await.unwrap(), 0);
        assert_eq!(store.all_tasks().unwrap()[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_empty_target_fails_without_retry() {
        let channel = Arc::new(MockChannel::reliable());
        let (store, recorder, dispatcher) = setup(channel.clone(), "");
        checkin(&recorder);

        assert_eq!(dispatcher.drain_once().await.unwrap(), 0);
        let task = &store.all_tasks().unwrap()[0];
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 0); // never attempted
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_worker_loop_drains_queue() {
        let channel = Arc::new(MockChannel::reliable());
        let (store, recorder, dispatcher) = setup(channel.clone(), "chat-1");
        let dispatcher = Arc::new(dispatcher);
        checkin(&recorder);

        dispatcher.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        dispatcher.stop().await;

        assert_eq!(channel.sent().len(), 1);
        assert_eq!(store.all_tasks().unwrap()[0].status, TaskStatus::Sent);
    }

    #[test]
    fn test_render_message_includes_note() {
        let record = AttendanceRecord {
            subject_id: "s-1".into(),
            date: local(16, 5, 0).with_timezone(&offset()).date_naive(),
            event_type: EventType::Out,
            status: Status::Absent,
            source: RecordSource::Sweep,
            recorded_at: local(16, 5, 0),
            note: Some("missing out event".into()),
        };
        let message = render_message(&record, "Ani", offset());
        assert!(message.contains("Ani"));
        assert!(message.contains("absent"));
        assert!(message.contains("16:05"));
        assert!(message.contains("missing out event"));
    }
}
