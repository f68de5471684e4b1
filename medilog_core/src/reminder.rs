//! Reminder planning for upcoming doses.
//!
//! Only computes when reminders are due; delivering them is up to the host.

use crate::selector::is_upcoming;
use crate::{DoseLog, MedicationSchedule};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Longest planning horizon the configuration accepts
pub const MAX_HORIZON_HOURS: u32 = 24 * 366;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reminder {
    pub dose_id: String,
    pub medication_id: String,
    pub drug_name: String,
    pub dosage: String,
    pub scheduled_time: DateTime<Utc>,
    /// When the reminder should fire, never earlier than the planning time
    pub fire_at: DateTime<Utc>,
}

/// Reminders for upcoming doses scheduled within `(now, now + horizon]`
///
/// Only doses of active schedules with reminders enabled are included. Each
/// reminder fires `reminder_minutes_before` ahead of its dose, clamped to
/// `now`. Sorted by fire time, then scheduled time. A horizon reaching past
/// the representable range covers every future dose.
pub fn pending_reminders(
    doses: &[DoseLog],
    medications: &[MedicationSchedule],
    now: DateTime<Utc>,
    horizon: Duration,
) -> Vec<Reminder> {
    let schedules: HashMap<&str, &MedicationSchedule> = medications
        .iter()
        .filter(|m| m.active && m.reminder_enabled)
        .map(|m| (m.id.as_str(), m))
        .collect();
    let until = now
        .checked_add_signed(horizon)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut reminders: Vec<Reminder> = doses
        .iter()
        .filter(|d| is_upcoming(d, now) && d.scheduled_time <= until)
        .filter_map(|d| {
            let schedule = schedules.get(d.medication_id.as_str())?;
            let lead = Duration::minutes(i64::from(schedule.reminder_minutes_before));
            Some(Reminder {
                dose_id: d.id.clone(),
                medication_id: d.medication_id.clone(),
                drug_name: d.drug_name.clone(),
                dosage: d.dosage.clone(),
                scheduled_time: d.scheduled_time,
                fire_at: d
                    .scheduled_time
                    .checked_sub_signed(lead)
                    .map_or(now, |t| t.max(now)),
            })
        })
        .collect();

    reminders.sort_by_key(|r| (r.fire_at, r.scheduled_time));
    tracing::debug!(
        "Planned {} reminders until {}",
        reminders.len(),
        until.to_rfc3339()
    );
    reminders
}
