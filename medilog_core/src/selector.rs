//! Views over a dose collection: one day's today/upcoming/history split, and
//! filtered listings.

use crate::{DoseLog, DoseStatus};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// The three views of one calendar day
#[derive(Clone, Debug, PartialEq)]
pub struct DailyDoses {
    pub date: NaiveDate,
    /// Every dose scheduled on `date`, ascending by scheduled time
    pub today: Vec<DoseLog>,
    /// Still `scheduled` and later than now
    pub upcoming: Vec<DoseLog>,
    /// `today` minus `upcoming`
    pub history: Vec<DoseLog>,
}

/// Whether a dose is still ahead of `now`
pub fn is_upcoming(dose: &DoseLog, now: DateTime<Utc>) -> bool {
    dose.status == DoseStatus::Scheduled && dose.scheduled_time > now
}

/// Build the daily views for `reference_date` in zone `tz`
///
/// Day membership is decided by each dose's stored scheduled time, so a dose
/// at 23:59:59.999 stays on its day no matter when this runs.
pub fn select_daily<Tz: TimeZone>(
    doses: &[DoseLog],
    reference_date: NaiveDate,
    now: DateTime<Utc>,
    tz: &Tz,
) -> DailyDoses {
    let mut today: Vec<DoseLog> = doses
        .iter()
        .filter(|d| d.local_date(tz) == reference_date)
        .cloned()
        .collect();

    // Stable: equal times keep collection order
    today.sort_by_key(|d| d.scheduled_time);

    let (upcoming, history): (Vec<DoseLog>, Vec<DoseLog>) =
        today.iter().cloned().partition(|d| is_upcoming(d, now));

    tracing::debug!(
        "Selected {} doses for {} ({} upcoming)",
        today.len(),
        reference_date,
        upcoming.len()
    );

    DailyDoses {
        date: reference_date,
        today,
        upcoming,
        history,
    }
}

/// Daily views for the local date of `now`
pub fn select_today<Tz: TimeZone>(doses: &[DoseLog], now: DateTime<Utc>, tz: &Tz) -> DailyDoses {
    let date = now.with_timezone(tz).date_naive();
    select_daily(doses, date, now, tz)
}

/// Criteria for listing doses; unset fields match everything
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DoseFilter {
    pub medication_id: Option<String>,
    /// Compared against the stored status, not the classified state
    pub status: Option<DoseStatus>,
    /// First local date included
    pub from: Option<NaiveDate>,
    /// Last local date included
    pub to: Option<NaiveDate>,
}

impl DoseFilter {
    pub fn matches<Tz: TimeZone>(&self, dose: &DoseLog, tz: &Tz) -> bool {
        if let Some(id) = &self.medication_id {
            if &dose.medication_id != id {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if &dose.status != status {
                return false;
            }
        }
        let date = dose.local_date(tz);
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

/// Doses matching `filter`, ascending by scheduled time (stable)
pub fn filter_doses<Tz: TimeZone>(doses: &[DoseLog], filter: &DoseFilter, tz: &Tz) -> Vec<DoseLog> {
    let mut matched: Vec<DoseLog> = doses
        .iter()
        .filter(|d| filter.matches(d, tz))
        .cloned()
        .collect();
    matched.sort_by_key(|d| d.scheduled_time);
    matched
}
