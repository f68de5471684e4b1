//! CSV export of the dose history.
//!
//! The export is written to a temp file next to the target, synced, then
//! renamed over it, so an interrupted export never leaves a partial file.

use crate::{DoseLog, Error, Result};
use std::path::Path;
use tempfile::NamedTempFile;

const HEADERS: [&str; 8] = [
    "id",
    "medication_id",
    "drug_name",
    "dosage",
    "scheduled_time",
    "actual_time",
    "status",
    "notes",
];

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    medication_id: &'a str,
    drug_name: &'a str,
    dosage: &'a str,
    scheduled_time: String,
    actual_time: Option<String>,
    status: &'a str,
    notes: Option<&'a str>,
}

impl<'a> From<&'a DoseLog> for CsvRow<'a> {
    fn from(dose: &'a DoseLog) -> Self {
        CsvRow {
            id: &dose.id,
            medication_id: &dose.medication_id,
            drug_name: &dose.drug_name,
            dosage: &dose.dosage,
            scheduled_time: dose.scheduled_time.to_rfc3339(),
            actual_time: dose.actual_time.map(|t| t.to_rfc3339()),
            status: dose.status.as_str(),
            notes: dose.notes.as_deref(),
        }
    }
}

/// Write every dose to `path` as CSV, replacing any existing file
///
/// Rows keep the order of `doses`. Returns the number of rows written.
pub fn export_doses_csv(doses: &[DoseLog], path: &Path) -> Result<usize> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;

    // Header written by hand so an empty export still has one
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(temp.as_file());
    writer.write_record(HEADERS)?;
    for dose in doses {
        writer.serialize(CsvRow::from(dose))?;
    }
    writer.flush()?;
    drop(writer);

    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::info!("Exported {} doses to {:?}", doses.len(), path);
    Ok(doses.len())
}
