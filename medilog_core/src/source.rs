//! The data-access capability shared by the mock fixture and the local store.
//!
//! Callers read a snapshot (`drugs`, `medications`, `doses`) and run the pure
//! computations on it; writes go through the mutation methods. Which variant
//! is used is decided once at startup from the configuration.

use crate::catalog::{self, validate_drug};
use crate::config::{Backend, Config};
use crate::mock::MockSource;
use crate::schedule::materialize;
use crate::store::LocalStore;
use crate::{
    DoseAction, DoseLog, Drug, DrugUpdate, Error, MedicationSchedule, MedicationUpdate, Result,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashSet;

/// Read and write access to drugs, schedules and dose records
pub trait DataSource {
    /// Short variant name for logs
    fn name(&self) -> &'static str;

    fn drugs(&self) -> Result<Vec<Drug>>;

    fn drug(&self, id: &str) -> Result<Drug> {
        self.drugs()?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::not_found("drug", id))
    }

    fn search_drugs(&self, query: Option<&str>, category: Option<&str>) -> Result<Vec<Drug>> {
        let drugs = self.drugs()?;
        Ok(catalog::search_drugs(&drugs, query, category)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Add a reference drug; ids must be unique
    fn add_drug(&mut self, drug: Drug) -> Result<()>;

    /// Edit a reference drug; the result must still validate
    fn update_drug(&mut self, id: &str, update: &DrugUpdate) -> Result<Drug>;

    /// Remove a reference drug no schedule refers to
    fn delete_drug(&mut self, id: &str) -> Result<Drug>;

    fn medications(&self, active_only: bool) -> Result<Vec<MedicationSchedule>>;

    /// Store a new schedule without generating doses
    fn insert_medication(&mut self, schedule: MedicationSchedule) -> Result<()>;

    /// Edit a schedule; doses already generated are left as they are
    fn update_medication(
        &mut self,
        id: &str,
        update: &MedicationUpdate,
    ) -> Result<MedicationSchedule>;

    /// Activate or deactivate a schedule; existing doses are kept
    fn set_medication_active(&mut self, id: &str, active: bool) -> Result<MedicationSchedule> {
        self.update_medication(
            id,
            &MedicationUpdate {
                active: Some(active),
                ..Default::default()
            },
        )
    }

    fn doses(&self) -> Result<Vec<DoseLog>>;

    fn insert_doses(&mut self, doses: Vec<DoseLog>) -> Result<()>;

    /// Apply a transition to a stored dose and return the updated record
    fn update_dose(&mut self, id: &str, action: DoseAction) -> Result<DoseLog>;

    fn mark_dose_taken(
        &mut self,
        id: &str,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<DoseLog> {
        self.update_dose(id, DoseAction::Take { at, notes })
    }

    fn mark_dose_skipped(&mut self, id: &str, notes: Option<String>) -> Result<DoseLog> {
        self.update_dose(id, DoseAction::Skip { notes })
    }

    fn mark_dose_missed(&mut self, id: &str) -> Result<DoseLog> {
        self.update_dose(id, DoseAction::Miss)
    }

    fn report_side_effects(&mut self, id: &str, effects: Vec<String>) -> Result<DoseLog> {
        if effects.iter().all(|e| e.trim().is_empty()) {
            return Err(Error::Validation("no side effects given".into()));
        }
        self.update_dose(id, DoseAction::ReportSideEffects { effects })
    }
}

/// Checks shared by every variant before a drug is stored
pub(crate) fn check_new_drug(existing: &[Drug], drug: &Drug) -> Result<()> {
    let errors = validate_drug(drug);
    if !errors.is_empty() {
        return Err(Error::Validation(errors.join("; ")));
    }
    if existing.iter().any(|d| d.id == drug.id) {
        return Err(Error::Validation(format!("drug id {} already exists", drug.id)));
    }
    Ok(())
}

/// Apply a drug edit inside `drugs`, validating the result before storing it
pub(crate) fn edit_drug(drugs: &mut [Drug], id: &str, update: &DrugUpdate) -> Result<Drug> {
    let slot = drugs
        .iter_mut()
        .find(|d| d.id == id)
        .ok_or_else(|| Error::not_found("drug", id))?;

    let mut edited = slot.clone();
    update.apply(&mut edited);
    let errors = validate_drug(&edited);
    if !errors.is_empty() {
        return Err(Error::Validation(errors.join("; ")));
    }
    *slot = edited.clone();
    Ok(edited)
}

/// Remove a drug from `drugs` unless a schedule still uses it
pub(crate) fn remove_drug(
    drugs: &mut Vec<Drug>,
    medications: &[MedicationSchedule],
    id: &str,
) -> Result<Drug> {
    let index = drugs
        .iter()
        .position(|d| d.id == id)
        .ok_or_else(|| Error::not_found("drug", id))?;
    if let Some(schedule) = medications.iter().find(|m| m.drug_id == id) {
        return Err(Error::Validation(format!(
            "drug {} is used by medication {}",
            id, schedule.id
        )));
    }
    Ok(drugs.remove(index))
}

/// Apply a schedule edit inside `medications`, validating the result first
pub(crate) fn edit_medication(
    medications: &mut [MedicationSchedule],
    id: &str,
    update: &MedicationUpdate,
) -> Result<MedicationSchedule> {
    let slot = medications
        .iter_mut()
        .find(|m| m.id == id)
        .ok_or_else(|| Error::not_found("medication", id))?;

    let mut edited = slot.clone();
    update.apply(&mut edited);
    edited.validate()?;
    *slot = edited.clone();
    Ok(edited)
}

/// Checks shared by every variant before a schedule is stored
pub(crate) fn check_new_medication(
    drugs: &[Drug],
    medications: &[MedicationSchedule],
    schedule: &MedicationSchedule,
) -> Result<()> {
    schedule.validate()?;
    if medications.iter().any(|m| m.id == schedule.id) {
        return Err(Error::Validation(format!(
            "medication id {} already exists",
            schedule.id
        )));
    }
    if !drugs.iter().any(|d| d.id == schedule.drug_id) {
        return Err(Error::not_found("drug", schedule.drug_id.clone()));
    }
    Ok(())
}

/// Store a schedule together with its doses for the next `days` days
pub fn register_medication<S, Tz>(
    source: &mut S,
    schedule: MedicationSchedule,
    tz: &Tz,
    from: NaiveDate,
    days: u32,
) -> Result<Vec<DoseLog>>
where
    S: DataSource + ?Sized,
    Tz: TimeZone,
{
    schedule.validate()?;
    let doses = materialize(&schedule, from, days, tz)?;

    let id = schedule.id.clone();
    source.insert_medication(schedule)?;
    source.insert_doses(doses.clone())?;

    tracing::info!("Registered medication {} with {} doses", id, doses.len());
    Ok(doses)
}

/// Generate doses for active schedules up to `from + days`, skipping
/// occurrences that already exist
///
/// Returns the number of doses added.
pub fn refill_doses<S, Tz>(source: &mut S, tz: &Tz, from: NaiveDate, days: u32) -> Result<usize>
where
    S: DataSource + ?Sized,
    Tz: TimeZone,
{
    let existing: HashSet<(String, DateTime<Utc>)> = source
        .doses()?
        .into_iter()
        .map(|d| (d.medication_id, d.scheduled_time))
        .collect();

    let mut missing = Vec::new();
    for schedule in source.medications(true)? {
        for dose in materialize(&schedule, from, days, tz)? {
            if !existing.contains(&(dose.medication_id.clone(), dose.scheduled_time)) {
                missing.push(dose);
            }
        }
    }

    let added = missing.len();
    if added > 0 {
        source.insert_doses(missing)?;
        tracing::info!("Added {} doses from {} over {} days", added, from, days);
    }
    Ok(added)
}

/// Open the configured data source
///
/// The mock fixture is built around `now` in zone `tz`.
pub fn open_source<Tz: TimeZone>(
    config: &Config,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<Box<dyn DataSource>> {
    let source: Box<dyn DataSource> = match config.data.backend {
        Backend::Mock => Box::new(MockSource::with_fixture(now, tz)?),
        Backend::Local => Box::new(LocalStore::open(&config.data.data_dir)?),
    };
    tracing::debug!("Opened {} data source", source.name());
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DosageForm, DoseStatus, FrequencyType};
    use chrono::Duration;

    fn schedule(id: &str, drug_id: &str, times: &[&str]) -> MedicationSchedule {
        MedicationSchedule {
            id: id.into(),
            drug_id: drug_id.into(),
            drug_name: "Crestor 10mg".into(),
            dosage: "10mg".into(),
            dosage_form: DosageForm::Tablet,
            frequency: FrequencyType::Daily,
            custom_frequency: None,
            specific_times: times.iter().map(|s| s.to_string()).collect(),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: None,
            with_food: false,
            special_instructions: None,
            reminder_enabled: true,
            reminder_minutes_before: 15,
            active: true,
        }
    }

    fn source() -> MockSource {
        let mut source = MockSource::new();
        for drug in crate::catalog::get_default_catalog() {
            source.add_drug(drug.clone()).unwrap();
        }
        source
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_register_medication_materializes_doses() {
        let mut source = source();
        let doses =
            register_medication(&mut source, schedule("m1", "4", &["22:00"]), &Utc, day(1), 7)
                .unwrap();

        assert_eq!(doses.len(), 7);
        assert_eq!(source.medications(true).unwrap().len(), 1);
        assert_eq!(source.doses().unwrap().len(), 7);
    }

    #[test]
    fn test_register_rejects_invalid_schedule() {
        let mut source = source();
        let result = register_medication(&mut source, schedule("m1", "4", &["noon"]), &Utc, day(1), 7);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(source.medications(false).unwrap().is_empty());
        assert!(source.doses().unwrap().is_empty());
    }

    #[test]
    fn test_register_rejects_unknown_drug() {
        let mut source = source();
        let result = register_medication(&mut source, schedule("m1", "99", &["08:00"]), &Utc, day(1), 7);
        assert!(matches!(result, Err(Error::NotFound { kind: "drug", .. })));
    }

    #[test]
    fn test_refill_only_adds_missing_doses() {
        let mut source = source();
        register_medication(&mut source, schedule("m1", "4", &["22:00"]), &Utc, day(1), 3).unwrap();

        let added = refill_doses(&mut source, &Utc, day(2), 4).unwrap();
        assert_eq!(added, 2); // June 4 and 5
        assert_eq!(source.doses().unwrap().len(), 5);

        assert_eq!(refill_doses(&mut source, &Utc, day(2), 4).unwrap(), 0);
    }

    #[test]
    fn test_refill_ignores_stopped_schedules() {
        let mut source = source();
        register_medication(&mut source, schedule("m1", "4", &["22:00"]), &Utc, day(1), 1).unwrap();
        source.set_medication_active("m1", false).unwrap();

        assert_eq!(refill_doses(&mut source, &Utc, day(1), 7).unwrap(), 0);
    }

    #[test]
    fn test_provided_mark_operations() {
        let mut source = source();
        let doses =
            register_medication(&mut source, schedule("m1", "4", &["22:00"]), &Utc, day(1), 3)
                .unwrap();
        let at = doses[0].scheduled_time + Duration::minutes(5);

        let taken = source
            .mark_dose_taken(&doses[0].id, Some("with dinner".into()), at)
            .unwrap();
        assert_eq!(taken.status, DoseStatus::Taken);
        assert_eq!(taken.actual_time, Some(at));

        let skipped = source.mark_dose_skipped(&doses[1].id, None).unwrap();
        assert_eq!(skipped.status, DoseStatus::Skipped);

        let missed = source.mark_dose_missed(&doses[2].id).unwrap();
        assert_eq!(missed.status, DoseStatus::Missed);
        assert!(missed.actual_time.is_none());

        assert!(matches!(
            source.mark_dose_missed("nope"),
            Err(Error::NotFound { kind: "dose", .. })
        ));
    }

    #[test]
    fn test_drug_lookup_and_duplicates() {
        let mut source = source();
        assert_eq!(source.drug("2").unwrap().name, "Plavix 75mg");
        assert!(source.drug("99").is_err());
        assert_eq!(source.search_drugs(Some("rosuva"), None).unwrap().len(), 1);
        assert_eq!(source.search_drugs(None, Some("Statin")).unwrap().len(), 1);

        let duplicate = source.drug("2").unwrap();
        assert!(matches!(source.add_drug(duplicate), Err(Error::Validation(_))));
    }

    #[test]
    fn test_update_and_delete_drug() {
        let mut source = source();

        let update = DrugUpdate {
            description: Some("Lowers LDL".into()),
            peak_concentration_time: Some(4.0),
            ..Default::default()
        };
        let edited = source.update_drug("5", &update).unwrap();
        assert_eq!(edited.description.as_deref(), Some("Lowers LDL"));
        assert_eq!(source.drug("5").unwrap(), edited);

        let invalid = DrugUpdate {
            half_life: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(source.update_drug("5", &invalid), Err(Error::Validation(_))));
        assert_eq!(source.drug("5").unwrap(), edited);

        assert!(matches!(
            source.update_drug("99", &update),
            Err(Error::NotFound { kind: "drug", .. })
        ));

        let removed = source.delete_drug("5").unwrap();
        assert_eq!(removed.id, "5");
        assert!(source.drug("5").is_err());
        assert!(matches!(source.delete_drug("5"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_drug_in_use_cannot_be_deleted() {
        let mut source = source();
        register_medication(&mut source, schedule("m1", "4", &["22:00"]), &Utc, day(1), 1).unwrap();

        assert!(matches!(source.delete_drug("4"), Err(Error::Validation(_))));
        assert!(source.drug("4").is_ok());
    }

    #[test]
    fn test_update_medication() {
        let mut source = source();
        let doses =
            register_medication(&mut source, schedule("m1", "4", &["22:00"]), &Utc, day(1), 2)
                .unwrap();

        let update = MedicationUpdate {
            dosage: Some("20mg".into()),
            specific_times: Some(vec!["21:00".into()]),
            ..Default::default()
        };
        let edited = source.update_medication("m1", &update).unwrap();
        assert_eq!(edited.dosage, "20mg");
        assert_eq!(source.medications(true).unwrap()[0], edited);

        // Generated doses are untouched, new ones follow the edit
        assert_eq!(source.doses().unwrap(), doses);
        assert_eq!(refill_doses(&mut source, &Utc, day(3), 1).unwrap(), 1);
        let latest = source.doses().unwrap().pop().unwrap();
        assert_eq!(latest.dosage, "20mg");
        assert_eq!(latest.scheduled_time.format("%H:%M").to_string(), "21:00");

        let bad = MedicationUpdate {
            specific_times: Some(vec!["late".into()]),
            ..Default::default()
        };
        assert!(source.update_medication("m1", &bad).is_err());
        assert_eq!(source.medications(true).unwrap()[0], edited);
    }

    #[test]
    fn test_report_side_effects() {
        let mut source = source();
        let doses =
            register_medication(&mut source, schedule("m1", "4", &["22:00"]), &Utc, day(1), 1)
                .unwrap();

        let dose = source
            .report_side_effects(&doses[0].id, vec!["muscle pain".into()])
            .unwrap();
        assert_eq!(dose.side_effects_reported, vec!["muscle pain"]);
        assert_eq!(dose.status, DoseStatus::Scheduled);

        assert!(matches!(
            source.report_side_effects(&doses[0].id, vec!["  ".into()]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_open_mock_source() {
        let mut config = Config::default();
        config.data.backend = Backend::Mock;
        let now = Utc::now();

        let source = open_source(&config, now, &Utc).unwrap();
        assert_eq!(source.name(), "mock");
        assert_eq!(source.medications(true).unwrap().len(), 3);
    }

    #[test]
    fn test_open_local_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data.data_dir = temp_dir.path().to_path_buf();

        let source = open_source(&config, Utc::now(), &Utc).unwrap();
        assert_eq!(source.name(), "local");
        assert!(!source.drugs().unwrap().is_empty());
    }
}
