//! Presensi error taxonomy.
//!
//! Note that "already recorded" is deliberately *not* here: a duplicate scan
//! or a lost insert race is a defined no-op outcome (`IngestOutcome` in the
//! engine crate), not a failure. Notification delivery failures are likewise
//! confined to the task's own status and never surface on the commit path.

use thiserror::Error;

/// All errors the attendance engine can produce.
#[derive(Debug, Error)]
pub enum PresensiError {
    /// Bad input rejected before any store interaction: unknown subject,
    /// future date, invalid enum value, invalid override.
    #[error("validation: {0}")]
    Validation(String),

    /// Transient store failure (busy/locked/timeout). The caller may retry,
    /// e.g. the scanning station asks the user to scan again.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Non-transient store failure (corrupt row, failed migration, ...).
    #[error("store: {0}")]
    Store(String),

    /// Notification channel failure. Only the dispatcher ever sees this;
    /// it is recorded on the task, never returned to a scanner.
    #[error("channel: {0}")]
    Channel(String),

    /// Bad or unparseable configuration.
    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PresensiError>;
