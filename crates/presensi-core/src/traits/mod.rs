//! Collaborator traits — the seams between the engine and the outside world.

pub mod channel;
pub mod roster;
pub mod store;

pub use channel::NotificationChannel;
pub use roster::RosterSource;
pub use store::{AttendanceStore, InsertResult, NotificationQueue, SweepCursorStore};
