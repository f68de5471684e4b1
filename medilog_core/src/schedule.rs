//! Turning medication schedules into concrete dose occurrences.

use crate::{DoseLog, Error, FrequencyType, MedicationSchedule, Result};
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Days of doses generated when a schedule is registered
pub const DEFAULT_MATERIALIZE_DAYS: u32 = 7;

/// Longest horizon doses are generated for in one call
pub const MAX_MATERIALIZE_DAYS: u32 = 366;

/// Parse a daily clock time in "HH:MM" form
pub fn parse_clock_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| Error::Validation(format!("invalid clock time {:?}: {}", s, e)))
}

impl MedicationSchedule {
    /// Parsed daily times, ascending and without duplicates
    pub fn clock_times(&self) -> Result<Vec<NaiveTime>> {
        let mut times = self
            .specific_times
            .iter()
            .map(|s| parse_clock_time(s))
            .collect::<Result<Vec<_>>>()?;
        times.sort();
        times.dedup();
        Ok(times)
    }

    /// Whether the schedule produces doses on `date`
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.active && date >= self.start_date && self.end_date.map_or(true, |end| date <= end)
    }

    /// Check a schedule before it is stored
    pub fn validate(&self) -> Result<()> {
        if self.drug_id.trim().is_empty() {
            return Err(Error::Validation("schedule has no drug id".into()));
        }
        if self.drug_name.trim().is_empty() {
            return Err(Error::Validation("schedule has no drug name".into()));
        }
        if self.dosage.trim().is_empty() {
            return Err(Error::Validation("schedule has no dosage".into()));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(Error::Validation(format!(
                    "end date {} is before start date {}",
                    end, self.start_date
                )));
            }
        }
        let times = self.clock_times()?;
        if times.is_empty() && self.frequency != FrequencyType::AsNeeded {
            return Err(Error::Validation(
                "schedule needs at least one daily time".into(),
            ));
        }
        if let Some(expected) = self.frequency.times_per_day() {
            if times.len() != expected {
                tracing::warn!(
                    "Schedule {} is {:?} but lists {} daily times",
                    self.id,
                    self.frequency,
                    times.len()
                );
            }
        }
        Ok(())
    }
}

/// Generate one `scheduled` dose per daily time for `days` days from `from`
///
/// Dates outside the schedule's range are skipped. A local time that does
/// not exist in `tz` (DST gap) is skipped; an ambiguous one uses the earlier
/// instant. More than [`MAX_MATERIALIZE_DAYS`] days is a validation error.
pub fn materialize<Tz: TimeZone>(
    schedule: &MedicationSchedule,
    from: NaiveDate,
    days: u32,
    tz: &Tz,
) -> Result<Vec<DoseLog>> {
    if days > MAX_MATERIALIZE_DAYS {
        return Err(Error::Validation(format!(
            "cannot generate doses for {} days (at most {})",
            days, MAX_MATERIALIZE_DAYS
        )));
    }
    let times = schedule.clock_times()?;
    let mut doses = Vec::with_capacity(times.len() * days as usize);

    for offset in 0..i64::from(days) {
        let Some(date) = from.checked_add_signed(Duration::days(offset)) else {
            break;
        };
        if !schedule.is_active_on(date) {
            continue;
        }

        for time in &times {
            let local = date.and_time(*time);
            match tz.from_local_datetime(&local).earliest() {
                Some(instant) => {
                    doses.push(DoseLog::scheduled(schedule, instant.with_timezone(&Utc)));
                }
                None => {
                    tracing::warn!(
                        "Skipping {} for schedule {}: local time does not exist",
                        local,
                        schedule.id
                    );
                }
            }
        }
    }

    tracing::debug!(
        "Materialized {} doses for schedule {} from {}",
        doses.len(),
        schedule.id,
        from
    );
    Ok(doses)
}
