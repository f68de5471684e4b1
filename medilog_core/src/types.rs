//! Core domain types for Medilog.
//!
//! This module defines the fundamental types used throughout the system:
//! - Drugs and their pharmacokinetic reference data
//! - Medication schedules (recurring prescriptions)
//! - Dose logs (concrete scheduled occurrences) and their transitions
//! - Progress statistics

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

// ============================================================================
// Drug Reference Types
// ============================================================================

/// Physical form a dose is delivered in
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DosageForm {
    Tablet,
    Capsule,
    Liquid,
    Injection,
    Topical,
    Inhaler,
    Patch,
}

impl FromStr for DosageForm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tablet" => Ok(Self::Tablet),
            "capsule" => Ok(Self::Capsule),
            "liquid" => Ok(Self::Liquid),
            "injection" => Ok(Self::Injection),
            "topical" => Ok(Self::Topical),
            "inhaler" => Ok(Self::Inhaler),
            "patch" => Ok(Self::Patch),
            other => Err(Error::Validation(format!("unknown dosage form: {}", other))),
        }
    }
}

/// Pharmacokinetic parameters, all optional
///
/// Times are in hours, percentages in 0-100.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Pharmacokinetics {
    pub absorption_time: Option<f64>,
    /// Tmax
    pub peak_concentration_time: Option<f64>,
    pub half_life: Option<f64>,
    pub bioavailability: Option<f64>,
    pub protein_binding: Option<f64>,
    /// L/kg
    pub volume_distribution: Option<f64>,
    /// mL/min
    pub clearance_rate: Option<f64>,
    pub metabolism_pathway: Option<String>,
    pub excretion_route: Option<String>,
}

/// A drug in the reference database
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Drug {
    pub id: String,
    pub name: String,
    pub active_ingredient: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dosage_forms: Vec<DosageForm>,
    #[serde(default)]
    pub standard_dosages: Vec<String>,
    #[serde(default)]
    pub pharmacokinetics: Option<Pharmacokinetics>,
    #[serde(default)]
    pub interactions: Vec<String>,
    #[serde(default)]
    pub contraindications: Vec<String>,
    #[serde(default)]
    pub side_effects: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Drug {
    /// Create a drug with a fresh id and empty reference lists
    pub fn new(name: impl Into<String>, active_ingredient: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            active_ingredient: active_ingredient.into(),
            description: None,
            dosage_forms: Vec::new(),
            standard_dosages: Vec::new(),
            pharmacokinetics: None,
            interactions: Vec::new(),
            contraindications: Vec::new(),
            side_effects: Vec::new(),
            warnings: Vec::new(),
            category: None,
        }
    }
}

/// Partial edit of a reference drug; `None` leaves a field unchanged
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrugUpdate {
    pub name: Option<String>,
    pub active_ingredient: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub standard_dosages: Option<Vec<String>>,
    /// Tmax in hours
    pub peak_concentration_time: Option<f64>,
    pub half_life: Option<f64>,
}

impl DrugUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the edit in place; the id never changes
    pub fn apply(&self, drug: &mut Drug) {
        if let Some(name) = &self.name {
            drug.name = name.clone();
        }
        if let Some(ingredient) = &self.active_ingredient {
            drug.active_ingredient = ingredient.clone();
        }
        if let Some(description) = &self.description {
            drug.description = Some(description.clone());
        }
        if let Some(category) = &self.category {
            drug.category = Some(category.clone());
        }
        if let Some(dosages) = &self.standard_dosages {
            drug.standard_dosages = dosages.clone();
        }
        if self.peak_concentration_time.is_some() || self.half_life.is_some() {
            let pk = drug.pharmacokinetics.get_or_insert_with(Pharmacokinetics::default);
            if let Some(tmax) = self.peak_concentration_time {
                pk.peak_concentration_time = Some(tmax);
            }
            if let Some(half_life) = self.half_life {
                pk.half_life = Some(half_life);
            }
        }
    }
}

// ============================================================================
// Medication Schedule Types
// ============================================================================

/// How often a medication is taken
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyType {
    Daily,
    TwiceDaily,
    ThreeTimesDaily,
    FourTimesDaily,
    Weekly,
    AsNeeded,
    Custom,
}

impl FrequencyType {
    /// Number of daily clock times this frequency implies, when fixed
    pub fn times_per_day(&self) -> Option<usize> {
        match self {
            Self::Daily => Some(1),
            Self::TwiceDaily => Some(2),
            Self::ThreeTimesDaily => Some(3),
            Self::FourTimesDaily => Some(4),
            Self::Weekly | Self::AsNeeded | Self::Custom => None,
        }
    }
}

impl FromStr for FrequencyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "twice_daily" => Ok(Self::TwiceDaily),
            "three_times_daily" => Ok(Self::ThreeTimesDaily),
            "four_times_daily" => Ok(Self::FourTimesDaily),
            "weekly" => Ok(Self::Weekly),
            "as_needed" => Ok(Self::AsNeeded),
            "custom" => Ok(Self::Custom),
            other => Err(Error::Validation(format!("unknown frequency: {}", other))),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_reminder_minutes() -> u32 {
    15
}

/// A patient's recurring prescription
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationSchedule {
    pub id: String,
    pub drug_id: String,
    /// Denormalized for display
    pub drug_name: String,
    pub dosage: String,
    pub dosage_form: DosageForm,
    pub frequency: FrequencyType,
    #[serde(default)]
    pub custom_frequency: Option<String>,
    /// Daily clock times, "HH:MM"
    #[serde(default)]
    pub specific_times: Vec<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub with_food: bool,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default = "default_true")]
    pub reminder_enabled: bool,
    #[serde(default = "default_reminder_minutes")]
    pub reminder_minutes_before: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Partial edit of a schedule; `None` leaves a field unchanged
///
/// Doses generated before the edit keep their time and dosage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MedicationUpdate {
    pub dosage: Option<String>,
    pub frequency: Option<FrequencyType>,
    pub specific_times: Option<Vec<String>>,
    pub end_date: Option<NaiveDate>,
    pub with_food: Option<bool>,
    pub special_instructions: Option<String>,
    pub reminder_enabled: Option<bool>,
    pub reminder_minutes_before: Option<u32>,
    pub active: Option<bool>,
}

impl MedicationUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, schedule: &mut MedicationSchedule) {
        if let Some(dosage) = &self.dosage {
            schedule.dosage = dosage.clone();
        }
        if let Some(frequency) = self.frequency {
            schedule.frequency = frequency;
        }
        if let Some(times) = &self.specific_times {
            schedule.specific_times = times.clone();
        }
        if let Some(end) = self.end_date {
            schedule.end_date = Some(end);
        }
        if let Some(with_food) = self.with_food {
            schedule.with_food = with_food;
        }
        if let Some(instructions) = &self.special_instructions {
            schedule.special_instructions = Some(instructions.clone());
        }
        if let Some(enabled) = self.reminder_enabled {
            schedule.reminder_enabled = enabled;
        }
        if let Some(minutes) = self.reminder_minutes_before {
            schedule.reminder_minutes_before = minutes;
        }
        if let Some(active) = self.active {
            schedule.active = active;
        }
    }
}

// ============================================================================
// Dose Types
// ============================================================================

/// Stored status of a dose
///
/// Strings outside the four known values are kept verbatim in `Other` so a
/// stored record with an unexpected status still loads and can be reported
/// by the classifier instead of being silently rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DoseStatus {
    Scheduled,
    Taken,
    Missed,
    Skipped,
    Other(String),
}

impl DoseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Taken => "taken",
            Self::Missed => "missed",
            Self::Skipped => "skipped",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for DoseStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "scheduled" => Self::Scheduled,
            "taken" => Self::Taken,
            "missed" => Self::Missed,
            "skipped" => Self::Skipped,
            _ => Self::Other(s),
        }
    }
}

impl From<DoseStatus> for String {
    fn from(status: DoseStatus) -> Self {
        match status {
            DoseStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// Strict parse: unknown strings are an error rather than `Other`
impl FromStr for DoseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match DoseStatus::from(s.to_string()) {
            DoseStatus::Other(other) => Err(Error::UnknownStatus(other)),
            known => Ok(known),
        }
    }
}

impl fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete scheduled occurrence of a medication
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DoseLog {
    pub id: String,
    pub medication_id: String,
    pub drug_name: String,
    pub dosage: String,
    pub scheduled_time: DateTime<Utc>,
    #[serde(default)]
    pub actual_time: Option<DateTime<Utc>>,
    pub status: DoseStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub side_effects_reported: Vec<String>,
}

/// A status transition applied to a stored dose
#[derive(Clone, Debug, PartialEq)]
pub enum DoseAction {
    Take {
        at: DateTime<Utc>,
        notes: Option<String>,
    },
    Skip {
        notes: Option<String>,
    },
    Miss,
    /// Record side effects without changing the status
    ReportSideEffects {
        effects: Vec<String>,
    },
}

impl DoseLog {
    /// A fresh `scheduled` occurrence for a schedule
    pub fn scheduled(schedule: &MedicationSchedule, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            medication_id: schedule.id.clone(),
            drug_name: schedule.drug_name.clone(),
            dosage: schedule.dosage.clone(),
            scheduled_time,
            actual_time: None,
            status: DoseStatus::Scheduled,
            notes: None,
            side_effects_reported: Vec::new(),
        }
    }

    /// `taken` if and only if an actual time is recorded
    pub fn is_consistent(&self) -> bool {
        (self.status == DoseStatus::Taken) == self.actual_time.is_some()
    }

    /// Calendar date of the scheduled time in the given zone
    pub fn local_date<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.scheduled_time.with_timezone(tz).date_naive()
    }

    /// Apply a transition, keeping status and actual time in step
    pub fn apply(&mut self, action: DoseAction) {
        match action {
            DoseAction::Take { at, notes } => {
                self.status = DoseStatus::Taken;
                self.actual_time = Some(at);
                if notes.is_some() {
                    self.notes = notes;
                }
            }
            DoseAction::Skip { notes } => {
                self.status = DoseStatus::Skipped;
                self.actual_time = None;
                if notes.is_some() {
                    self.notes = notes;
                }
            }
            DoseAction::Miss => {
                self.status = DoseStatus::Missed;
                self.actual_time = None;
            }
            DoseAction::ReportSideEffects { effects } => {
                for effect in effects {
                    let effect = effect.trim();
                    if !effect.is_empty()
                        && !self.side_effects_reported.iter().any(|e| e == effect)
                    {
                        self.side_effects_reported.push(effect.to_string());
                    }
                }
            }
        }
    }
}

// ============================================================================
// Progress Types
// ============================================================================

/// Aggregate adherence over a window, recomputed on demand
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressStats {
    pub total_doses_scheduled: u32,
    pub doses_taken: u32,
    pub doses_missed: u32,
    pub doses_skipped: u32,
    /// Percentage in 0-100
    pub adherence_rate: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_active_medications: u32,
}
