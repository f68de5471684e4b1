//! Local persistent data source.
//!
//! Layout under the data directory:
//! - `wal/state.json`: drugs and schedules (`Registry`), rewritten atomically
//! - `wal/doses.wal`: append-only dose journal, replayed on every read

use crate::catalog::get_default_catalog;
use crate::source::{
    check_new_drug, check_new_medication, edit_drug, edit_medication, remove_drug, DataSource,
};
use crate::state::Registry;
use crate::wal::{self, DoseSink, JsonlSink};
use crate::{
    DoseAction, DoseLog, Drug, DrugUpdate, Error, MedicationSchedule, MedicationUpdate, Result,
};
use std::path::{Path, PathBuf};

pub struct LocalStore {
    registry_path: PathBuf,
    journal: JsonlSink,
}

impl LocalStore {
    /// Open the store in `data_dir`, seeding the drug catalog on first use
    ///
    /// Fails with `Error::State` if an existing registry cannot be parsed.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let wal_dir = data_dir.join("wal");
        std::fs::create_dir_all(&wal_dir)?;

        let registry_path = wal_dir.join("state.json");
        let journal = JsonlSink::new(wal_dir.join("doses.wal"));

        if Registry::load(&registry_path)?.is_none() {
            let seeded = Registry {
                drugs: get_default_catalog().to_vec(),
                medications: Vec::new(),
            };
            seeded.save(&registry_path)?;
            tracing::info!(
                "Initialized data directory {:?} with {} catalog drugs",
                data_dir,
                seeded.drugs.len()
            );
        }

        Ok(Self {
            registry_path,
            journal,
        })
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn journal_path(&self) -> &Path {
        self.journal.path()
    }

    fn registry(&self) -> Result<Registry> {
        Ok(Registry::load(&self.registry_path)?.unwrap_or_default())
    }

    /// Drop superseded journal records
    pub fn compact(&self) -> Result<usize> {
        wal::compact(self.journal.path())
    }
}

impl DataSource for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn drugs(&self) -> Result<Vec<Drug>> {
        Ok(self.registry()?.drugs)
    }

    fn drug(&self, id: &str) -> Result<Drug> {
        self.registry()?
            .drug(id)
            .cloned()
            .ok_or_else(|| Error::not_found("drug", id))
    }

    fn add_drug(&mut self, drug: Drug) -> Result<()> {
        let id = drug.id.clone();
        Registry::update(&self.registry_path, |r| {
            check_new_drug(&r.drugs, &drug)?;
            r.drugs.push(drug);
            Ok(())
        })?;
        tracing::info!("Added drug {}", id);
        Ok(())
    }

    fn update_drug(&mut self, id: &str, update: &DrugUpdate) -> Result<Drug> {
        let drug = Registry::update(&self.registry_path, |r| {
            edit_drug(&mut r.drugs, id, update)
        })?;
        tracing::info!("Updated drug {}", id);
        Ok(drug)
    }

    fn delete_drug(&mut self, id: &str) -> Result<Drug> {
        let drug = Registry::update(&self.registry_path, |r| {
            remove_drug(&mut r.drugs, &r.medications, id)
        })?;
        tracing::info!("Deleted drug {}", id);
        Ok(drug)
    }

    fn medications(&self, active_only: bool) -> Result<Vec<MedicationSchedule>> {
        let mut medications = self.registry()?.medications;
        if active_only {
            medications.retain(|m| m.active);
        }
        Ok(medications)
    }

    fn insert_medication(&mut self, schedule: MedicationSchedule) -> Result<()> {
        Registry::update(&self.registry_path, |r| {
            check_new_medication(&r.drugs, &r.medications, &schedule)?;
            r.medications.push(schedule);
            Ok(())
        })
    }

    fn update_medication(
        &mut self,
        id: &str,
        update: &MedicationUpdate,
    ) -> Result<MedicationSchedule> {
        let schedule = Registry::update(&self.registry_path, |r| {
            edit_medication(&mut r.medications, id, update)
        })?;
        tracing::info!("Updated medication {} (active = {})", id, schedule.active);
        Ok(schedule)
    }

    fn doses(&self) -> Result<Vec<DoseLog>> {
        wal::read_doses(self.journal.path())
    }

    fn insert_doses(&mut self, doses: Vec<DoseLog>) -> Result<()> {
        self.journal.append_all(&doses)
    }

    fn update_dose(&mut self, id: &str, action: DoseAction) -> Result<DoseLog> {
        let mut dose = self
            .doses()?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::not_found("dose", id))?;
        dose.apply(action);
        self.journal.append(&dose)?;
        tracing::info!("Dose {} is now {}", dose.id, dose.status);
        Ok(dose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::register_medication;
    use crate::{DosageForm, DoseStatus, FrequencyType};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::io::Write;

    fn schedule() -> MedicationSchedule {
        MedicationSchedule {
            id: "med-ezetrol".into(),
            drug_id: "5".into(),
            drug_name: "Ezetrol 10mg".into(),
            dosage: "10mg".into(),
            dosage_form: DosageForm::Tablet,
            frequency: FrequencyType::Daily,
            custom_frequency: None,
            specific_times: vec!["21:00".into()],
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: None,
            with_food: false,
            special_instructions: None,
            reminder_enabled: true,
            reminder_minutes_before: 15,
            active: true,
        }
    }

    fn register(store: &mut LocalStore) -> Vec<DoseLog> {
        let from = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        register_medication(store, schedule(), &Utc, from, 3).unwrap()
    }

    #[test]
    fn test_open_seeds_catalog() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(temp_dir.path()).unwrap();

        assert!(store.registry_path().exists());
        assert_eq!(store.drugs().unwrap().len(), get_default_catalog().len());
        assert!(store.medications(false).unwrap().is_empty());
        assert!(store.doses().unwrap().is_empty());
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let doses = {
            let mut store = LocalStore::open(temp_dir.path()).unwrap();
            register(&mut store)
        };

        let store = LocalStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.medications(true).unwrap().len(), 1);
        assert_eq!(store.doses().unwrap(), doses);
    }

    #[test]
    fn test_update_dose_appends_and_replays() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::open(temp_dir.path()).unwrap();
        let doses = register(&mut store);
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 21, 3, 0).unwrap();

        store.mark_dose_taken(&doses[0].id, None, at).unwrap();
        store.mark_dose_missed(&doses[0].id).unwrap();

        let replayed = store.doses().unwrap();
        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed[0].id, doses[0].id);
        assert_eq!(replayed[0].status, DoseStatus::Missed);
        assert!(replayed[0].actual_time.is_none());

        assert_eq!(wal::read_records(store.journal_path()).unwrap().len(), 5);
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::open(temp_dir.path()).unwrap();

        assert!(matches!(
            store.mark_dose_skipped("missing", None),
            Err(Error::NotFound { kind: "dose", .. })
        ));
        assert!(matches!(
            store.set_medication_active("missing", false),
            Err(Error::NotFound { kind: "medication", .. })
        ));
    }

    #[test]
    fn test_stop_medication_keeps_doses() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::open(temp_dir.path()).unwrap();
        register(&mut store);

        let stopped = store.set_medication_active("med-ezetrol", false).unwrap();
        assert!(!stopped.active);
        assert!(store.medications(true).unwrap().is_empty());
        assert_eq!(store.medications(false).unwrap().len(), 1);
        assert_eq!(store.doses().unwrap().len(), 3);
    }

    #[test]
    fn test_add_drug_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::open(temp_dir.path()).unwrap();

        let drug = Drug::new("Eliquis 5mg", "Apixaban");
        let id = drug.id.clone();
        store.add_drug(drug).unwrap();

        let reopened = LocalStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.drug(&id).unwrap().active_ingredient, "Apixaban");

        let invalid = Drug::new("", "");
        assert!(store.add_drug(invalid).is_err());
    }

    #[test]
    fn test_edits_persist_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let doses = {
            let mut store = LocalStore::open(temp_dir.path()).unwrap();
            let doses = register(&mut store);
            store
                .update_medication(
                    "med-ezetrol",
                    &MedicationUpdate {
                        with_food: Some(true),
                        ..Default::default()
                    },
                )
                .unwrap();
            store
                .update_drug(
                    "6",
                    &DrugUpdate {
                        category: Some("Antihypertensive".into()),
                        ..Default::default()
                    },
                )
                .unwrap();
            store
                .report_side_effects(&doses[0].id, vec!["headache".into()])
                .unwrap();
            doses
        };

        let mut store = LocalStore::open(temp_dir.path()).unwrap();
        assert!(store.medications(true).unwrap()[0].with_food);
        assert_eq!(
            store.drug("6").unwrap().category.as_deref(),
            Some("Antihypertensive")
        );
        assert_eq!(store.doses().unwrap()[0].side_effects_reported, vec!["headache"]);
        assert_eq!(store.doses().unwrap()[0].id, doses[0].id);

        assert!(matches!(store.delete_drug("5"), Err(Error::Validation(_))));
        store.delete_drug("6").unwrap();
        assert!(matches!(
            LocalStore::open(temp_dir.path()).unwrap().drug("6"),
            Err(Error::NotFound { kind: "drug", .. })
        ));
    }

    #[test]
    fn test_corrupt_registry_fails_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        LocalStore::open(temp_dir.path()).unwrap();

        let registry = temp_dir.path().join("wal").join("state.json");
        std::fs::write(&registry, "not json").unwrap();

        assert!(matches!(
            LocalStore::open(temp_dir.path()),
            Err(Error::State(_))
        ));
    }

    #[test]
    fn test_corrupt_journal_line_is_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::open(temp_dir.path()).unwrap();
        register(&mut store);

        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(store.journal_path())
                .unwrap();
            file.write_all(b"{\"id\": \"truncated\n").unwrap();
        }

        assert_eq!(store.doses().unwrap().len(), 3);
    }

    #[test]
    fn test_compact() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::open(temp_dir.path()).unwrap();
        let doses = register(&mut store);
        store.mark_dose_skipped(&doses[1].id, None).unwrap();

        assert_eq!(store.compact().unwrap(), 1);
        let after = store.doses().unwrap();
        assert_eq!(after.len(), 3);
        assert_eq!(after[1].status, DoseStatus::Skipped);
    }
}
