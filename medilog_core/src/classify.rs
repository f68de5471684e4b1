//! Read-time classification of doses into display states.
//!
//! Classification never mutates a dose. A `scheduled` dose whose time has
//! passed is reported as [`DoseState::Overdue`]; persisting it as `missed`
//! is a separate write owned by the data source.

use crate::{DoseLog, DoseStatus, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Display classification of a dose at a given instant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseState {
    Taken,
    Missed,
    Skipped,
    /// Still `scheduled` but due (scheduled time at or before now)
    Overdue,
    /// Still `scheduled` and in the future
    Upcoming,
}

/// Color/icon/label semantics handed to the presentation layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Presentation {
    pub color: &'static str,
    pub icon: &'static str,
    pub label: &'static str,
}

impl Presentation {
    /// Generic display for a dose whose status could not be classified
    pub const FALLBACK: Presentation = Presentation {
        color: "#94A3B8",
        icon: "help-circle",
        label: "Unknown",
    };
}

impl DoseState {
    pub fn presentation(&self) -> Presentation {
        match self {
            DoseState::Taken => Presentation {
                color: "#10B981",
                icon: "checkmark-circle",
                label: "Taken",
            },
            DoseState::Missed => Presentation {
                color: "#EF4444",
                icon: "close-circle",
                label: "Missed",
            },
            DoseState::Skipped => Presentation {
                color: "#64748B",
                icon: "remove-circle",
                label: "Skipped",
            },
            DoseState::Overdue => Presentation {
                color: "#F97316",
                icon: "alert-circle",
                label: "Overdue",
            },
            DoseState::Upcoming => Presentation {
                color: "#F59E0B",
                icon: "time",
                label: "Pending",
            },
        }
    }

    /// Taken, missed and skipped never change with time
    pub fn is_final(&self) -> bool {
        matches!(self, DoseState::Taken | DoseState::Missed | DoseState::Skipped)
    }

    /// Missed, or due without action
    pub fn counts_as_missed(&self) -> bool {
        matches!(self, DoseState::Missed | DoseState::Overdue)
    }
}

/// Classify a stored status against the current instant
pub fn classify_status(
    status: &DoseStatus,
    scheduled_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DoseState> {
    match status {
        DoseStatus::Taken => Ok(DoseState::Taken),
        DoseStatus::Missed => Ok(DoseState::Missed),
        DoseStatus::Skipped => Ok(DoseState::Skipped),
        DoseStatus::Scheduled if scheduled_time <= now => Ok(DoseState::Overdue),
        DoseStatus::Scheduled => Ok(DoseState::Upcoming),
        DoseStatus::Other(s) => Err(Error::UnknownStatus(s.clone())),
    }
}

/// Classify a dose log
pub fn classify(dose: &DoseLog, now: DateTime<Utc>) -> Result<DoseState> {
    classify_status(&dose.status, dose.scheduled_time, now).map_err(|e| {
        tracing::debug!("Dose {} could not be classified: {}", dose.id, e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn dose(status: DoseStatus, scheduled_time: DateTime<Utc>) -> DoseLog {
        DoseLog {
            id: "dose-1".into(),
            medication_id: "med-1".into(),
            drug_name: "Coraspin 100mg".into(),
            dosage: "100mg".into(),
            scheduled_time,
            actual_time: None,
            status,
            notes: None,
            side_effects_reported: vec![],
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_final_states_ignore_time() {
        let past = now() - Duration::hours(3);
        let future = now() + Duration::hours(3);

        for t in [past, future] {
            assert_eq!(
                classify_status(&DoseStatus::Taken, t, now()).unwrap(),
                DoseState::Taken
            );
            assert_eq!(
                classify_status(&DoseStatus::Missed, t, now()).unwrap(),
                DoseState::Missed
            );
            assert_eq!(
                classify_status(&DoseStatus::Skipped, t, now()).unwrap(),
                DoseState::Skipped
            );
        }
    }

    #[test]
    fn test_taken_with_actual_time_classifies_taken() {
        let mut d = dose(
            DoseStatus::Taken,
            Utc.with_ymd_and_hms(2024, 6, 1, 21, 0, 0).unwrap(),
        );
        d.actual_time = Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 5, 0).unwrap());
        assert_eq!(classify(&d, now()).unwrap(), DoseState::Taken);
    }

    #[test]
    fn test_morning_due_evening_upcoming() {
        let morning = dose(
            DoseStatus::Scheduled,
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        );
        let evening = dose(
            DoseStatus::Scheduled,
            Utc.with_ymd_and_hms(2024, 6, 1, 21, 0, 0).unwrap(),
        );

        assert_eq!(classify(&morning, now()).unwrap(), DoseState::Overdue);
        assert_eq!(classify(&evening, now()).unwrap(), DoseState::Upcoming);
    }

    #[test]
    fn test_dose_exactly_at_now_is_due() {
        let d = dose(DoseStatus::Scheduled, now());
        assert_eq!(classify(&d, now()).unwrap(), DoseState::Overdue);

        let just_after = dose(DoseStatus::Scheduled, now() + Duration::milliseconds(1));
        assert_eq!(classify(&just_after, now()).unwrap(), DoseState::Upcoming);
    }

    #[test]
    fn test_classification_does_not_mutate() {
        let d = dose(DoseStatus::Scheduled, now() - Duration::hours(1));
        let before = d.clone();
        let _ = classify(&d, now()).unwrap();
        assert_eq!(d, before);
        assert_eq!(d.status, DoseStatus::Scheduled);
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        let d = dose(DoseStatus::Other("paused".into()), now());
        match classify(&d, now()) {
            Err(Error::UnknownStatus(s)) => assert_eq!(s, "paused"),
            other => panic!("Expected UnknownStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_presentation_mapping() {
        assert_eq!(DoseState::Taken.presentation().color, "#10B981");
        assert_eq!(DoseState::Missed.presentation().color, "#EF4444");
        assert_eq!(DoseState::Upcoming.presentation().label, "Pending");
        assert_eq!(DoseState::Overdue.presentation().icon, "alert-circle");
        assert_eq!(Presentation::FALLBACK.label, "Unknown");

        assert!(DoseState::Overdue.counts_as_missed());
        assert!(DoseState::Missed.counts_as_missed());
        assert!(!DoseState::Skipped.counts_as_missed());
        assert!(!DoseState::Upcoming.is_final());
        assert!(DoseState::Skipped.is_final());
    }
}
