//! In-memory data source with a small demo fixture.

use crate::catalog::get_default_catalog;
use crate::schedule::materialize;
use crate::source::{
    check_new_drug, check_new_medication, edit_drug, edit_medication, remove_drug, DataSource,
};
use crate::{
    DosageForm, DoseAction, DoseLog, Drug, DrugUpdate, Error, FrequencyType, MedicationSchedule,
    MedicationUpdate, Result,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Catalog ids used by the fixture
const FIXTURE_DRUG_IDS: [&str; 3] = ["1", "2", "3"];

fn fixture_schedule(
    id: &str,
    drug: &Drug,
    dosage: &str,
    frequency: FrequencyType,
    times: &[&str],
    start_date: NaiveDate,
) -> MedicationSchedule {
    MedicationSchedule {
        id: id.into(),
        drug_id: drug.id.clone(),
        drug_name: drug.name.clone(),
        dosage: dosage.into(),
        dosage_form: DosageForm::Tablet,
        frequency,
        custom_frequency: None,
        specific_times: times.iter().map(|s| s.to_string()).collect(),
        start_date,
        end_date: None,
        with_food: false,
        special_instructions: None,
        reminder_enabled: true,
        reminder_minutes_before: 15,
        active: true,
    }
}

/// Data source backed by plain vectors; changes last as long as the value
#[derive(Clone, Debug, Default)]
pub struct MockSource {
    drugs: Vec<Drug>,
    medications: Vec<MedicationSchedule>,
    doses: Vec<DoseLog>,
}

impl MockSource {
    /// An empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Three cardiology drugs, three active schedules and today's doses
    ///
    /// Doses due before `now` are already marked taken, ten minutes after
    /// their scheduled time. Dose ids are `dose-1`, `dose-2`, ... in
    /// scheduled order.
    pub fn with_fixture<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> Result<Self> {
        let today = now.with_timezone(tz).date_naive();

        let drugs: Vec<Drug> = get_default_catalog()
            .iter()
            .filter(|d| FIXTURE_DRUG_IDS.contains(&d.id.as_str()))
            .cloned()
            .collect();

        let mut medications = Vec::new();
        if let [coraspin, plavix, concor] = drugs.as_slice() {
            let mut morning = fixture_schedule(
                "med-1",
                coraspin,
                "100mg",
                FrequencyType::Daily,
                &["09:00"],
                today,
            );
            morning.with_food = true;
            medications.push(morning);
            medications.push(fixture_schedule(
                "med-2",
                plavix,
                "75mg",
                FrequencyType::Daily,
                &["20:00"],
                today,
            ));
            medications.push(fixture_schedule(
                "med-3",
                concor,
                "5mg",
                FrequencyType::TwiceDaily,
                &["08:00", "20:00"],
                today,
            ));
        } else {
            return Err(Error::State("default catalog lacks fixture drugs".into()));
        }

        let mut doses = Vec::new();
        for schedule in &medications {
            doses.extend(materialize(schedule, today, 1, tz)?);
        }
        doses.sort_by_key(|d| d.scheduled_time);

        for (i, dose) in doses.iter_mut().enumerate() {
            dose.id = format!("dose-{}", i + 1);
            if dose.scheduled_time < now {
                let at = (dose.scheduled_time + Duration::minutes(10)).min(now);
                dose.apply(DoseAction::Take { at, notes: None });
            }
        }

        tracing::debug!("Built mock fixture for {} with {} doses", today, doses.len());
        Ok(Self {
            drugs,
            medications,
            doses,
        })
    }
}

impl DataSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn drugs(&self) -> Result<Vec<Drug>> {
        Ok(self.drugs.clone())
    }

    fn add_drug(&mut self, drug: Drug) -> Result<()> {
        check_new_drug(&self.drugs, &drug)?;
        self.drugs.push(drug);
        Ok(())
    }

    fn update_drug(&mut self, id: &str, update: &DrugUpdate) -> Result<Drug> {
        edit_drug(&mut self.drugs, id, update)
    }

    fn delete_drug(&mut self, id: &str) -> Result<Drug> {
        remove_drug(&mut self.drugs, &self.medications, id)
    }

    fn medications(&self, active_only: bool) -> Result<Vec<MedicationSchedule>> {
        Ok(self
            .medications
            .iter()
            .filter(|m| !active_only || m.active)
            .cloned()
            .collect())
    }

    fn insert_medication(&mut self, schedule: MedicationSchedule) -> Result<()> {
        check_new_medication(&self.drugs, &self.medications, &schedule)?;
        self.medications.push(schedule);
        Ok(())
    }

    fn update_medication(
        &mut self,
        id: &str,
        update: &MedicationUpdate,
    ) -> Result<MedicationSchedule> {
        edit_medication(&mut self.medications, id, update)
    }

    fn doses(&self) -> Result<Vec<DoseLog>> {
        Ok(self.doses.clone())
    }

    fn insert_doses(&mut self, doses: Vec<DoseLog>) -> Result<()> {
        self.doses.extend(doses);
        Ok(())
    }

    fn update_dose(&mut self, id: &str, action: DoseAction) -> Result<DoseLog> {
        let dose = self
            .doses
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::not_found("dose", id))?;
        dose.apply(action);
        Ok(dose.clone())
    }
}
