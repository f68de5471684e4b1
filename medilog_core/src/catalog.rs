//! Built-in drug reference catalog and drug lookups.
//!
//! The default catalog covers common cardiology drugs and is used to seed a
//! fresh local store and the mock data source.

use crate::types::*;
use once_cell::sync::Lazy;

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Vec<Drug>> = Lazy::new(build_default_catalog);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static [Drug] {
    &DEFAULT_CATALOG
}

struct PkSpec {
    absorption: f64,
    tmax: f64,
    half_life: f64,
    bioavailability: f64,
    protein_binding: f64,
    metabolism: Option<&'static str>,
    excretion: &'static str,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[allow(clippy::too_many_arguments)]
fn drug(
    id: &str,
    name: &str,
    ingredient: &str,
    description: &str,
    category: &str,
    dosages: &[&str],
    pk: PkSpec,
    interactions: &[&str],
    side_effects: &[&str],
    warnings: &[&str],
) -> Drug {
    Drug {
        id: id.into(),
        name: name.into(),
        active_ingredient: ingredient.into(),
        description: Some(description.into()),
        dosage_forms: vec![DosageForm::Tablet],
        standard_dosages: strings(dosages),
        pharmacokinetics: Some(Pharmacokinetics {
            absorption_time: Some(pk.absorption),
            peak_concentration_time: Some(pk.tmax),
            half_life: Some(pk.half_life),
            bioavailability: Some(pk.bioavailability),
            protein_binding: Some(pk.protein_binding),
            volume_distribution: None,
            clearance_rate: None,
            metabolism_pathway: pk.metabolism.map(String::from),
            excretion_route: Some(pk.excretion.into()),
        }),
        interactions: strings(interactions),
        contraindications: Vec::new(),
        side_effects: strings(side_effects),
        warnings: strings(warnings),
        category: Some(category.into()),
    }
}

/// Builds the default catalog
///
/// **Note**: For production use, prefer `get_default_catalog()` which returns a
/// cached reference.
pub fn build_default_catalog() -> Vec<Drug> {
    vec![
        drug(
            "1",
            "Coraspin 100mg",
            "Acetylsalicylic acid",
            "Antiplatelet used to lower heart attack and stroke risk",
            "Antiplatelet",
            &["100mg"],
            PkSpec {
                absorption: 0.5,
                tmax: 1.5,
                half_life: 3.5,
                bioavailability: 70.0,
                protein_binding: 99.0,
                metabolism: Some("Hepatic"),
                excretion: "Renal",
            },
            &["Warfarin", "NSAID"],
            &["Nausea", "Bleeding risk"],
            &["Do not take on an empty stomach"],
        ),
        drug(
            "2",
            "Plavix 75mg",
            "Clopidogrel",
            "Prevents blood clots after heart attack or stroke",
            "Antiplatelet",
            &["75mg", "300mg"],
            PkSpec {
                absorption: 1.0,
                tmax: 2.0,
                half_life: 7.0,
                bioavailability: 50.0,
                protein_binding: 98.0,
                metabolism: Some("Hepatic CYP2C19"),
                excretion: "Renal and biliary",
            },
            &["Aspirin", "Warfarin", "Omeprazole"],
            &["Bleeding", "Bruising"],
            &["Tell your doctor before any surgery"],
        ),
        drug(
            "3",
            "Concor 5mg",
            "Bisoprolol",
            "Beta blocker for high blood pressure and heart failure",
            "Beta blocker",
            &["2.5mg", "5mg", "10mg"],
            PkSpec {
                absorption: 2.0,
                tmax: 3.0,
                half_life: 11.0,
                bioavailability: 90.0,
                protein_binding: 30.0,
                metabolism: Some("Hepatic"),
                excretion: "Renal",
            },
            &["Verapamil", "Diltiazem"],
            &["Fatigue", "Dizziness"],
            &["Do not stop abruptly"],
        ),
        drug(
            "4",
            "Crestor 10mg",
            "Rosuvastatin",
            "Statin that lowers LDL cholesterol",
            "Statin",
            &["5mg", "10mg", "20mg"],
            PkSpec {
                absorption: 3.0,
                tmax: 5.0,
                half_life: 19.0,
                bioavailability: 20.0,
                protein_binding: 88.0,
                metabolism: Some("CYP2C9 (minor)"),
                excretion: "Fecal",
            },
            &["Cyclosporine", "Gemfibrozil"],
            &["Muscle pain", "Headache"],
            &["Report unexplained muscle pain"],
        ),
        drug(
            "5",
            "Ezetrol 10mg",
            "Ezetimibe",
            "Cholesterol absorption inhibitor",
            "Cholesterol absorption inhibitor",
            &["10mg"],
            PkSpec {
                absorption: 1.0,
                tmax: 1.5,
                half_life: 22.0,
                bioavailability: 35.0,
                protein_binding: 99.0,
                metabolism: Some("Glucuronidation"),
                excretion: "Fecal",
            },
            &["Cyclosporine", "Fibrates"],
            &["Diarrhea", "Fatigue"],
            &[],
        ),
        drug(
            "6",
            "Norvasc 5mg",
            "Amlodipine",
            "Calcium channel blocker for blood pressure and angina",
            "Calcium channel blocker",
            &["5mg", "10mg"],
            PkSpec {
                absorption: 6.0,
                tmax: 8.0,
                half_life: 40.0,
                bioavailability: 64.0,
                protein_binding: 97.0,
                metabolism: Some("Hepatic CYP3A4"),
                excretion: "Renal",
            },
            &["Simvastatin", "Grapefruit juice"],
            &["Ankle swelling", "Flushing"],
            &["Avoid grapefruit juice"],
        ),
        drug(
            "7",
            "Delix 5mg",
            "Ramipril",
            "ACE inhibitor for blood pressure and heart protection",
            "ACE inhibitor",
            &["2.5mg", "5mg", "10mg"],
            PkSpec {
                absorption: 1.0,
                tmax: 3.0,
                half_life: 13.0,
                bioavailability: 28.0,
                protein_binding: 73.0,
                metabolism: Some("Hepatic"),
                excretion: "Renal",
            },
            &["Potassium supplements", "NSAID"],
            &["Dry cough", "Dizziness"],
            &["Stand up slowly"],
        ),
    ]
}

/// Filter drugs by a case-insensitive name/ingredient query and exact category
pub fn search_drugs<'a>(
    drugs: &'a [Drug],
    query: Option<&str>,
    category: Option<&str>,
) -> Vec<&'a Drug> {
    let needle = query
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    drugs
        .iter()
        .filter(|d| match &needle {
            Some(q) => {
                d.name.to_lowercase().contains(q) || d.active_ingredient.to_lowercase().contains(q)
            }
            None => true,
        })
        .filter(|d| match category {
            Some(c) => d.category.as_deref() == Some(c),
            None => true,
        })
        .collect()
}

/// Validate a drug record, returning every problem found
pub fn validate_drug(drug: &Drug) -> Vec<String> {
    let mut errors = Vec::new();

    if drug.id.trim().is_empty() {
        errors.push("Drug has empty ID".to_string());
    }
    if drug.name.trim().is_empty() {
        errors.push(format!("Drug '{}' has empty name", drug.id));
    }
    if drug.active_ingredient.trim().is_empty() {
        errors.push(format!("Drug '{}' has empty active ingredient", drug.id));
    }

    if let Some(pk) = &drug.pharmacokinetics {
        let times = [
            ("absorption_time", pk.absorption_time),
            ("peak_concentration_time", pk.peak_concentration_time),
            ("half_life", pk.half_life),
        ];
        for (name, value) in times {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    errors.push(format!("Drug '{}': {} must be > 0, got {}", drug.id, name, v));
                }
            }
        }

        let percentages = [
            ("bioavailability", pk.bioavailability),
            ("protein_binding", pk.protein_binding),
        ];
        for (name, value) in percentages {
            if let Some(v) = value {
                if !(0.0..=100.0).contains(&v) {
                    errors.push(format!(
                        "Drug '{}': {} must be within 0-100, got {}",
                        drug.id, name, v
                    ));
                }
            }
        }
    }

    errors
}
