//! Presensi configuration system.
//!
//! TOML file at `~/.presensi/config.toml`; every field has a serde default so
//! a missing file or a partial file still yields a working config. Cutoffs
//! and channel credentials are injected at construction — nothing in the
//! engine reads configuration at import time.

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{PresensiError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PresensiConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl PresensiConfig {
    /// Load config from the default path, falling back to defaults when the
    /// file does not exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PresensiError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PresensiError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| PresensiError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".presensi")
    }
}

/// Attendance store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.presensi/attendance.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Cutoffs, timezone, and sweep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Check-ins at or after this local time classify as late; it also opens
    /// the sweep's "in" absence window.
    #[serde(default = "default_late_after")]
    pub late_after: String,
    /// End-of-day cutoff that opens the sweep's "out" absence window.
    #[serde(default = "default_out_after")]
    pub out_after: String,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Local timezone as a fixed UTC offset in minutes (420 = UTC+7).
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
    /// Restrict the sweep to one roster group; None sweeps everyone.
    #[serde(default)]
    pub roster_group: Option<String>,
}

fn default_late_after() -> String {
    "07:30".into()
}
fn default_out_after() -> String {
    "16:00".into()
}
fn default_sweep_interval() -> u64 {
    3600
}
fn default_utc_offset() -> i32 {
    420
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            late_after: default_late_after(),
            out_after: default_out_after(),
            sweep_interval_secs: default_sweep_interval(),
            utc_offset_minutes: default_utc_offset(),
            roster_group: None,
        }
    }
}

impl ScheduleConfig {
    pub fn late_after_time(&self) -> Result<NaiveTime> {
        parse_cutoff(&self.late_after)
    }

    pub fn out_after_time(&self) -> Result<NaiveTime> {
        parse_cutoff(&self.out_after)
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            PresensiError::Config(format!(
                "utc_offset_minutes {} is out of range",
                self.utc_offset_minutes
            ))
        })
    }
}

/// Parse a `HH:MM` or `HH:MM:SS` cutoff string.
fn parse_cutoff(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| PresensiError::Config(format!("invalid cutoff time '{s}' (expected HH:MM)")))
}

/// Notification channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Which channel to deliver through: "none", "telegram", "webhook".
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    /// Total delivery attempts per task before it is marked failed
    /// (2 = one immediate retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_channel() -> String {
    "none".into()
}
fn default_send_timeout() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    2
}
fn default_poll_interval() -> u64 {
    5
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            bot_token: String::new(),
            webhook_url: String::new(),
            send_timeout_secs: default_send_timeout(),
            max_attempts: default_max_attempts(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PresensiConfig::default();
        assert_eq!(cfg.schedule.late_after, "07:30");
        assert_eq!(cfg.schedule.out_after, "16:00");
        assert_eq!(cfg.notify.channel, "none");
        assert_eq!(cfg.notify.max_attempts, 2);
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: PresensiConfig = toml::from_str(
            r#"
            [schedule]
            late_after = "07:15"
            utc_offset_minutes = 480

            [notify]
            channel = "telegram"
            bot_token = "123:abc"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.schedule.late_after, "07:15");
        assert_eq!(cfg.schedule.utc_offset_minutes, 480);
        assert_eq!(cfg.notify.channel, "telegram");
        // Untouched sections keep their defaults
        assert_eq!(cfg.schedule.out_after, "16:00");
        assert_eq!(cfg.store.db_path, "~/.presensi/attendance.db");
    }

    #[test]
    fn test_cutoff_parsing() {
        let sched = ScheduleConfig {
            late_after: "07:30:00".into(),
            ..Default::default()
        };
        assert_eq!(
            sched.late_after_time().unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert_eq!(
            sched.out_after_time().unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap()
        );

        let bad = ScheduleConfig {
            late_after: "half past seven".into(),
            ..Default::default()
        };
        assert!(bad.late_after_time().is_err());
    }

    #[test]
    fn test_offset() {
        let sched = ScheduleConfig::default();
        assert_eq!(
            sched.offset().unwrap(),
            FixedOffset::east_opt(7 * 3600).unwrap()
        );
    }
}
