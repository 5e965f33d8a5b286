//! Roster source — who is in scope for attendance tracking.

use crate::error::Result;
use crate::types::Subject;

/// Read access to the subject roster. Roster management itself (enrolment,
/// group changes) belongs to an external process; the engine only reads.
pub trait RosterSource: Send + Sync {
    fn get_subject(&self, id: &str) -> Result<Option<Subject>>;

    /// All subjects, optionally restricted to one roster group.
    fn list_subjects(&self, group: Option<&str>) -> Result<Vec<Subject>>;
}
