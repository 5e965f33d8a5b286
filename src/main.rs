//! # Presensi — attendance reconciliation & notification engine
//!
//! Usage:
//!   presensi serve                         # sweep scheduler + dispatcher
//!   presensi scan s-17 in                  # live check-in for subject s-17
//!   presensi scan s-17 in --status izin    # manual override (legacy words ok)
//!   presensi sweep                         # one sweep pass, print the report
//!   presensi roster add s-17 "Ani" --notify chat-17
//!   presensi recent --limit 20

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use presensi_channels::channel_from_config;
use presensi_core::clock::{Clock, SystemClock};
use presensi_core::config::PresensiConfig;
use presensi_core::types::{EventType, Status, Subject};
use presensi_engine::{
    Dispatcher, DispatcherConfig, IngestOutcome, Recorder, ScanEvent, SweepConfig, SweepScheduler,
};
use presensi_store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "presensi",
    version,
    about = "🎒 Presensi — attendance reconciliation & notification engine"
)]
struct Cli {
    /// Config file path (default: ~/.presensi/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sweep scheduler and notification dispatcher until ctrl-c
    Serve,
    /// Ingest one live scan event
    Scan {
        /// Subject id (as resolved by the scanning station)
        subject: String,
        /// Event type: in/out (masuk/pulang also accepted)
        event: String,
        /// Manual status override: permitted/sick (izin/sakit also accepted)
        #[arg(long)]
        status: Option<String>,
        /// Event timestamp, RFC 3339 (default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Run one sweep pass immediately and print the report
    Sweep,
    /// Roster management
    Roster {
        #[command(subcommand)]
        action: RosterCommand,
    },
    /// Show recent attendance records and their notification state
    Recent {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum RosterCommand {
    /// Add or update a subject
    Add {
        id: String,
        name: String,
        /// Badge / NISN-equivalent identifier
        #[arg(long, default_value = "")]
        external_id: String,
        #[arg(long, default_value = "default")]
        group: String,
        /// Notification target (e.g. Telegram chat id); empty disables
        #[arg(long, default_value = "")]
        notify: String,
    },
    /// List subjects
    List {
        #[arg(long)]
        group: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "presensi=debug,presensi_engine=debug,presensi_store=debug"
    } else {
        "presensi=info,presensi_engine=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => PresensiConfig::load_from(std::path::Path::new(path))?,
        None => PresensiConfig::load()?,
    };

    let db_path = shellexpand::tilde(&config.store.db_path).to_string();
    let store = Arc::new(SqliteStore::open(std::path::Path::new(&db_path))?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let offset = config.schedule.offset()?;
    let late_after = config.schedule.late_after_time()?;
    let out_after = config.schedule.out_after_time()?;

    let recorder = Arc::new(Recorder::new(
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        late_after,
        offset,
    ));

    match cli.command {
        Command::Serve => {
            let channel = channel_from_config(&config.notify)?;
            let dispatcher = Arc::new(Dispatcher::new(
                store.clone(),
                store.clone(),
                store.clone(),
                channel,
                DispatcherConfig {
                    max_attempts: config.notify.max_attempts,
                    poll_interval: std::time::Duration::from_secs(
                        config.notify.poll_interval_secs,
                    ),
                    offset,
                },
            ));
            let scheduler = Arc::new(SweepScheduler::new(
                recorder,
                store.clone(),
                store.clone(),
                store.clone(),
                clock,
                SweepConfig {
                    late_after,
                    out_after,
                    interval: std::time::Duration::from_secs(config.schedule.sweep_interval_secs),
                    offset,
                    roster_group: config.schedule.roster_group.clone(),
                },
            ));

            dispatcher.start();
            scheduler.start();
            tracing::info!("presensi serving (db: {db_path}); ctrl-c to stop");
            tokio::signal::ctrl_c().await?;

            scheduler.stop().await;
            dispatcher.stop().await;
        }

        Command::Scan {
            subject,
            event,
            status,
            at,
        } => {
            let event_type = EventType::parse(&event)?;
            let override_status = status.as_deref().map(Status::normalize).transpose()?;
            let occurred_at: DateTime<Utc> = match at {
                Some(s) => DateTime::parse_from_rfc3339(&s)
                    .with_context(|| format!("invalid --at timestamp '{s}'"))?
                    .with_timezone(&Utc),
                None => clock.now_utc(),
            };
            let scan = ScanEvent {
                subject_id: subject,
                date: occurred_at.with_timezone(&offset).date_naive(),
                event_type,
                occurred_at,
                override_status,
            };
            match recorder.ingest(&scan)? {
                IngestOutcome::Created { record, .. } => {
                    println!(
                        "recorded: {} {} {} → {}",
                        record.subject_id, record.date, record.event_type, record.status
                    );
                }
                IngestOutcome::AlreadyRecorded(record) => {
                    println!(
                        "already recorded: {} {} {} → {} (no new record)",
                        record.subject_id, record.date, record.event_type, record.status
                    );
                }
            }
        }

        Command::Sweep => {
            let scheduler = SweepScheduler::new(
                recorder,
                store.clone(),
                store.clone(),
                store.clone(),
                clock,
                SweepConfig {
                    late_after,
                    out_after,
                    interval: std::time::Duration::from_secs(config.schedule.sweep_interval_secs),
                    offset,
                    roster_group: config.schedule.roster_group.clone(),
                },
            );
            let report = scheduler.run_once()?;
            println!(
                "sweep for {}: windows {:?}, {} checked, {} reconciled, {} failed",
                report.date,
                report
                    .windows
                    .iter()
                    .map(|e| e.as_str())
                    .collect::<Vec<_>>(),
                report.checked,
                report.reconciled,
                report.failures.len()
            );
            for (subject, error) in &report.failures {
                println!("  failed {subject}: {error}");
            }
        }

        Command::Roster { action } => match action {
            RosterCommand::Add {
                id,
                name,
                external_id,
                group,
                notify,
            } => {
                store.upsert_subject(&Subject {
                    id: id.clone(),
                    display_name: name,
                    external_id,
                    roster_group: group,
                    notification_target: notify,
                })?;
                println!("subject '{id}' saved");
            }
            RosterCommand::List { group } => {
                use presensi_core::traits::roster::RosterSource;
                let subjects = store.list_subjects(group.as_deref())?;
                if subjects.is_empty() {
                    println!("(no subjects)");
                }
                for s in subjects {
                    println!(
                        "{}  {}  group={}  notify={}",
                        s.id,
                        s.display_name,
                        s.roster_group,
                        if s.notification_target.is_empty() {
                            "-"
                        } else {
                            &s.notification_target
                        }
                    );
                }
            }
        },

        Command::Recent { limit } => {
            use presensi_core::traits::store::{AttendanceStore, NotificationQueue};
            let records = store.recent(limit)?;
            if records.is_empty() {
                println!("(no records)");
            }
            for r in records {
                let delivery = store
                    .task_for(&r.subject_id, r.date, r.event_type)?
                    .map(|t| format!("{} ({} attempts)", t.status, t.attempts))
                    .unwrap_or_else(|| "no task".into());
                println!(
                    "{} {} {} → {} [{}] notify: {}",
                    r.date, r.subject_id, r.event_type, r.status, r.source, delivery
                );
            }
        }
    }

    Ok(())
}
