//! # Presensi Store
//!
//! Reference implementations of the attendance store collaborators:
//! - [`SqliteStore`] — the durable backend; the `(subject_id, date,
//!   event_type)` primary key plus `INSERT OR IGNORE` gives the atomic
//!   insert-if-absent the whole system's correctness hangs on.
//! - [`MemoryStore`] — a lock-protected in-memory backend with the same
//!   atomicity guarantee, used by engine tests.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
