//! Adherence statistics over a window of calendar days.
//!
//! All figures are derived from the dose collection handed in; nothing here
//! writes back. Overdue `scheduled` doses count as missed, future ones are
//! pending and counted in none of taken/missed/skipped.
//!
//! ## Streaks
//!
//! Each day with at least one dose gets a [`DayOutcome`]. The current streak
//! walks backward from the last day of the window; the longest streak scans
//! the whole window. In both walks:
//! - `Perfect` extends the run
//! - `Broken` ends it
//! - `Pending` days and days without doses are skipped

use crate::classify::{classify, DoseState};
use crate::{DoseLog, Error, MedicationSchedule, ProgressStats, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default window length in days
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Longest window the configuration accepts
pub const MAX_WINDOW_DAYS: u32 = 3660;

/// Inclusive range of local calendar days
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdherenceWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AdherenceWindow {
    /// The `days` calendar days ending on (and including) `end`
    pub fn ending_on(end: NaiveDate, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(Error::Validation(
                "adherence window must cover at least one day".into(),
            ));
        }
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days) - 1))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "a {} day window ending {} is out of range",
                    days, end
                ))
            })?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Per-day tally
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DailyAdherence {
    pub date: NaiveDate,
    pub scheduled: u32,
    pub taken: u32,
    pub missed: u32,
    pub skipped: u32,
    pub rate: f64,
}

/// Per-medication tally
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationAdherence {
    pub medication_id: String,
    pub drug_name: String,
    pub scheduled: u32,
    pub taken: u32,
    pub rate: f64,
}

/// Full progress output for a window
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub stats: ProgressStats,
    pub daily_adherence: Vec<DailyAdherence>,
    pub medications: Vec<MedicationAdherence>,
}

/// How a day with doses counts toward a streak
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayOutcome {
    /// Every dose taken
    Perfect,
    /// At least one dose missed, overdue or skipped
    Broken,
    /// Nothing broken yet, but some dose is still upcoming
    Pending,
}

#[derive(Default)]
struct DayTally {
    scheduled: u32,
    taken: u32,
    missed: u32,
    skipped: u32,
    pending: u32,
}

impl DayTally {
    fn record(&mut self, state: DoseState) {
        self.scheduled += 1;
        match state {
            DoseState::Taken => self.taken += 1,
            DoseState::Missed | DoseState::Overdue => self.missed += 1,
            DoseState::Skipped => self.skipped += 1,
            DoseState::Upcoming => self.pending += 1,
        }
    }

    fn outcome(&self) -> DayOutcome {
        if self.missed > 0 || self.skipped > 0 {
            DayOutcome::Broken
        } else if self.pending > 0 {
            DayOutcome::Pending
        } else {
            DayOutcome::Perfect
        }
    }
}

/// Percentage rounded to two decimals, 0 when nothing was scheduled
pub fn rate(taken: u32, scheduled: u32) -> f64 {
    if scheduled == 0 {
        return 0.0;
    }
    let pct = f64::from(taken) / f64::from(scheduled) * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Consecutive perfect days counted back from the most recent day
///
/// `days` must be in ascending date order.
pub fn current_streak(days: &[DayOutcome]) -> u32 {
    let mut streak = 0;
    for outcome in days.iter().rev() {
        match outcome {
            DayOutcome::Perfect => streak += 1,
            DayOutcome::Pending => continue,
            DayOutcome::Broken => break,
        }
    }
    streak
}

/// Longest run of perfect days
pub fn longest_streak(days: &[DayOutcome]) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    for outcome in days {
        match outcome {
            DayOutcome::Perfect => {
                run += 1;
                longest = longest.max(run);
            }
            DayOutcome::Pending => {}
            DayOutcome::Broken => run = 0,
        }
    }
    longest
}

/// Compute the progress report for the `days`-day window ending today
pub fn compute_progress<Tz: TimeZone>(
    doses: &[DoseLog],
    medications: &[MedicationSchedule],
    now: DateTime<Utc>,
    tz: &Tz,
    days: u32,
) -> Result<ProgressReport> {
    let window = AdherenceWindow::ending_on(now.with_timezone(tz).date_naive(), days)?;

    let mut per_day: BTreeMap<NaiveDate, DayTally> = BTreeMap::new();
    let mut per_med: BTreeMap<&str, (&str, DayTally)> = BTreeMap::new();
    let mut totals = DayTally::default();

    for dose in doses {
        let date = dose.local_date(tz);
        if !window.contains(date) {
            continue;
        }
        let state = classify(dose, now)?;

        totals.record(state);
        per_day.entry(date).or_default().record(state);
        per_med
            .entry(dose.medication_id.as_str())
            .or_insert_with(|| (dose.drug_name.as_str(), DayTally::default()))
            .1
            .record(state);
    }

    let outcomes: Vec<DayOutcome> = per_day.values().map(DayTally::outcome).collect();

    let stats = ProgressStats {
        total_doses_scheduled: totals.scheduled,
        doses_taken: totals.taken,
        doses_missed: totals.missed,
        doses_skipped: totals.skipped,
        adherence_rate: rate(totals.taken, totals.scheduled),
        current_streak: current_streak(&outcomes),
        longest_streak: longest_streak(&outcomes),
        total_active_medications: medications.iter().filter(|m| m.active).count() as u32,
    };

    let daily_adherence = per_day
        .iter()
        .map(|(date, t)| DailyAdherence {
            date: *date,
            scheduled: t.scheduled,
            taken: t.taken,
            missed: t.missed,
            skipped: t.skipped,
            rate: rate(t.taken, t.scheduled),
        })
        .collect();

    let medications = per_med
        .into_iter()
        .map(|(id, (name, t))| MedicationAdherence {
            medication_id: id.to_string(),
            drug_name: name.to_string(),
            scheduled: t.scheduled,
            taken: t.taken,
            rate: rate(t.taken, t.scheduled),
        })
        .collect();

    tracing::debug!(
        "Progress {}..={}: {} scheduled, {} taken, rate {}",
        window.start,
        window.end,
        stats.total_doses_scheduled,
        stats.doses_taken,
        stats.adherence_rate
    );

    Ok(ProgressReport {
        period_start: window.start,
        period_end: window.end,
        stats,
        daily_adherence,
        medications,
    })
}

/// Only the aggregate stats of [`compute_progress`]
pub fn compute_stats<Tz: TimeZone>(
    doses: &[DoseLog],
    medications: &[MedicationSchedule],
    now: DateTime<Utc>,
    tz: &Tz,
    days: u32,
) -> Result<ProgressStats> {
    compute_progress(doses, medications, now, tz, days).map(|report| report.stats)
}
