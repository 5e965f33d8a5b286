//! Status classifier — pure function, no I/O.

use chrono::NaiveTime;

use presensi_core::error::{PresensiError, Result};
use presensi_core::types::{EventType, Status};

/// Derive the status for one event.
///
/// A manual override (`permitted` or `sick`) wins verbatim; any other status
/// passed as an override is a validation error. Without an override,
/// check-ins strictly before `late_after` are `present` and at or after it
/// are `late` (the boundary second itself is late). Checkouts are always
/// `present` — there is no lateness concept for leaving.
pub fn classify(
    event_type: EventType,
    time_of_day: NaiveTime,
    late_after: NaiveTime,
    override_status: Option<Status>,
) -> Result<Status> {
    if let Some(status) = override_status {
        return match status {
            Status::Permitted | Status::Sick => Ok(status),
            other => Err(PresensiError::Validation(format!(
                "'{other}' cannot be used as a manual override"
            ))),
        };
    }
    Ok(match event_type {
        EventType::In => {
            if time_of_day < late_after {
                Status::Present
            } else {
                Status::Late
            }
        }
        EventType::Out => Status::Present,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    const CUTOFF: (u32, u32, u32) = (7, 30, 0);

    fn cutoff() -> NaiveTime {
        t(CUTOFF.0, CUTOFF.1, CUTOFF.2)
    }

    #[test]
    fn test_checkin_before_cutoff_is_present() {
        let status = classify(EventType::In, t(6, 45, 0), cutoff(), None).unwrap();
        assert_eq!(status, Status::Present);
    }

    #[test]
    fn test_boundary_is_inclusive_to_late() {
        // One second before the cutoff: present.
        assert_eq!(
            classify(EventType::In, t(7, 29, 59), cutoff(), None).unwrap(),
            Status::Present
        );
        // The exact cutoff second: late.
        assert_eq!(
            classify(EventType::In, t(7, 30, 0), cutoff(), None).unwrap(),
            Status::Late
        );
        assert_eq!(
            classify(EventType::In, t(9, 0, 0), cutoff(), None).unwrap(),
            Status::Late
        );
    }

    #[test]
    fn test_checkout_has_no_lateness() {
        assert_eq!(
            classify(EventType::Out, t(23, 59, 59), cutoff(), None).unwrap(),
            Status::Present
        );
    }

    #[test]
    fn test_override_wins_over_time() {
        // Even a very late check-in stays 'permitted' when overridden.
        assert_eq!(
            classify(EventType::In, t(11, 0, 0), cutoff(), Some(Status::Permitted)).unwrap(),
            Status::Permitted
        );
        assert_eq!(
            classify(EventType::Out, t(12, 0, 0), cutoff(), Some(Status::Sick)).unwrap(),
            Status::Sick
        );
    }

    #[test]
    fn test_invalid_override_rejected() {
        for bad in [Status::Present, Status::Late, Status::Absent] {
            assert!(classify(EventType::In, t(7, 0, 0), cutoff(), Some(bad)).is_err());
        }
    }
}
