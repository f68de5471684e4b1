//! Write-Ahead Log (WAL) for dose records.
//!
//! Every created or updated dose is appended to a JSONL (JSON Lines) file.
//! Replaying the journal keeps the last record written for each dose id (last
//! write wins) at the position where that id first appeared.
//!
//! Access is serialized on a sidecar `<journal>.lock` file rather than on the
//! journal itself, because compaction replaces the journal's inode: appends
//! and compaction take it exclusively, reads take it shared.

use crate::{DoseLog, Error, Result};
use fs2::FileExt;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Dose sink trait for persisting dose records
pub trait DoseSink {
    fn append(&mut self, dose: &DoseLog) -> Result<()>;

    fn append_all(&mut self, doses: &[DoseLog]) -> Result<()> {
        for dose in doses {
            self.append(dose)?;
        }
        Ok(())
    }
}

/// Path of the lock file guarding the journal at `path`
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn open_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))?;
    Ok(file)
}

/// JSONL-based dose journal with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a new JSONL sink for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_lines(&self, doses: &[DoseLog]) -> Result<()> {
        let lock = open_lock(&self.path)?;
        lock.lock_exclusive()?;

        // Opened under the lock so a compaction's rename is never missed
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = std::io::BufWriter::new(&file);
        for dose in doses {
            let line = serde_json::to_string(dose)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        drop(writer);

        lock.unlock()?;
        Ok(())
    }
}

impl DoseSink for JsonlSink {
    fn append(&mut self, dose: &DoseLog) -> Result<()> {
        self.write_lines(std::slice::from_ref(dose))?;
        tracing::debug!("Appended dose {} ({}) to WAL", dose.id, dose.status);
        Ok(())
    }

    /// Batch append under a single lock
    fn append_all(&mut self, doses: &[DoseLog]) -> Result<()> {
        if doses.is_empty() {
            return Ok(());
        }
        self.write_lines(doses)?;
        tracing::debug!("Appended {} doses to WAL", doses.len());
        Ok(())
    }
}

/// Parse every line of the journal; the caller holds the lock
fn parse_records(path: &Path) -> Result<Vec<DoseLog>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<DoseLog>(&line) {
            Ok(dose) => records.push(dose),
            Err(e) => {
                tracing::warn!("Failed to parse dose at line {}: {}", line_num + 1, e);
                // Continue reading, don't fail completely
            }
        }
    }

    Ok(records)
}

/// Fold records into one dose per id, last write wins
fn replay(records: Vec<DoseLog>) -> Vec<DoseLog> {
    let mut doses: Vec<DoseLog> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        match index.get(&record.id) {
            Some(&i) => doses[i] = record,
            None => {
                index.insert(record.id.clone(), doses.len());
                doses.push(record);
            }
        }
    }
    doses
}

/// Read every record in a WAL file, in write order
pub fn read_records(path: &Path) -> Result<Vec<DoseLog>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let lock = open_lock(path)?;
    lock.lock_shared()?;
    let records = parse_records(path)?;
    lock.unlock()?;
    Ok(records)
}

/// Replay the WAL into the current dose collection
///
/// Later records replace earlier ones with the same id; each id keeps the
/// position of its first record.
pub fn read_doses(path: &Path) -> Result<Vec<DoseLog>> {
    let records = read_records(path)?;
    let record_count = records.len();
    let doses = replay(records);

    for dose in doses.iter().filter(|d| !d.is_consistent()) {
        tracing::warn!(
            "Dose {} has status {} but actual time {:?}",
            dose.id,
            dose.status,
            dose.actual_time
        );
    }

    tracing::debug!(
        "Replayed {} WAL records into {} doses",
        record_count,
        doses.len()
    );
    Ok(doses)
}

/// Rewrite the WAL so it holds only the latest record per dose
///
/// Holds the journal lock across read, write and rename, so no append can
/// land in the replaced file. Returns the number of records dropped.
pub fn compact(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }

    let parent = path
        .parent()
        .ok_or_else(|| Error::State(format!("WAL path {:?} has no parent", path)))?;

    let lock = open_lock(path)?;
    lock.lock_exclusive()?;

    let records = parse_records(path)?;
    let before = records.len();
    let doses = replay(records);

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        for dose in &doses {
            let line = serde_json::to_string(dose)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    lock.unlock()?;

    let dropped = before.saturating_sub(doses.len());
    tracing::info!("Compacted WAL {:?}: dropped {} superseded records", path, dropped);
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DoseAction, DoseStatus};
    use chrono::{TimeZone, Utc};

    fn create_test_dose(id: &str) -> DoseLog {
        DoseLog {
            id: id.into(),
            medication_id: "med-1".into(),
            drug_name: "Plavix 75mg".into(),
            dosage: "75mg".into(),
            scheduled_time: Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap(),
            actual_time: None,
            status: DoseStatus::Scheduled,
            notes: None,
            side_effects_reported: vec![],
        }
    }

    #[test]
    fn test_append_and_read_single_dose() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("doses.wal");

        let mut sink = JsonlSink::new(&wal_path);
        sink.append(&create_test_dose("d1")).unwrap();

        let doses = read_doses(&wal_path).unwrap();
        assert_eq!(doses.len(), 1);
        assert_eq!(doses[0].id, "d1");
    }

    #[test]
    fn test_last_write_wins_keeps_first_position() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("doses.wal");

        let mut sink = JsonlSink::new(&wal_path);
        sink.append_all(&[create_test_dose("d1"), create_test_dose("d2")])
            .unwrap();

        let mut taken = create_test_dose("d1");
        taken.apply(DoseAction::Take {
            at: Utc.with_ymd_and_hms(2024, 6, 1, 20, 5, 0).unwrap(),
            notes: None,
        });
        sink.append(&taken).unwrap();

        let doses = read_doses(&wal_path).unwrap();
        assert_eq!(doses.len(), 2);
        assert_eq!(doses[0].id, "d1");
        assert_eq!(doses[0].status, DoseStatus::Taken);
        assert_eq!(doses[1].id, "d2");
        assert_eq!(read_records(&wal_path).unwrap().len(), 3);
    }

    #[test]
    fn test_read_empty_wal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("nonexistent.wal");

        assert!(read_doses(&wal_path).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("doses.wal");

        let mut sink = JsonlSink::new(&wal_path);
        sink.append(&create_test_dose("d1")).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
            file.write_all(b"{ not json }\n").unwrap();
        }
        sink.append(&create_test_dose("d2")).unwrap();

        let doses = read_doses(&wal_path).unwrap();
        assert_eq!(doses.len(), 2);
    }

    #[test]
    fn test_unknown_status_survives_replay() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("doses.wal");

        let mut dose = create_test_dose("d1");
        dose.status = DoseStatus::Other("paused".into());
        JsonlSink::new(&wal_path).append(&dose).unwrap();

        let doses = read_doses(&wal_path).unwrap();
        assert_eq!(doses[0].status, DoseStatus::Other("paused".into()));
    }

    #[test]
    fn test_compact_drops_superseded_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("doses.wal");

        let mut sink = JsonlSink::new(&wal_path);
        sink.append(&create_test_dose("d1")).unwrap();
        let mut skipped = create_test_dose("d1");
        skipped.apply(DoseAction::Skip { notes: None });
        sink.append(&skipped).unwrap();
        sink.append(&create_test_dose("d2")).unwrap();

        let dropped = compact(&wal_path).unwrap();
        assert_eq!(dropped, 1);

        let records = read_records(&wal_path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, DoseStatus::Skipped);

        // Only the journal and its lock file remain
        let mut entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["doses.wal", "doses.wal.lock"]);
    }

    #[test]
    fn test_lock_path_is_sidecar() {
        assert_eq!(
            lock_path(Path::new("/data/wal/doses.wal")),
            PathBuf::from("/data/wal/doses.wal.lock")
        );
    }

    #[test]
    fn test_appends_during_compaction_are_kept() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("doses.wal");

        let ids: Vec<String> = (0..40).map(|i| format!("d{}", i)).collect();
        let mut seed = JsonlSink::new(&wal_path);
        for id in &ids {
            seed.append(&create_test_dose(id)).unwrap();
        }

        let writers: Vec<_> = ids
            .chunks(10)
            .map(|chunk| {
                let wal_path = wal_path.clone();
                let chunk = chunk.to_vec();
                std::thread::spawn(move || {
                    let mut sink = JsonlSink::new(&wal_path);
                    for id in chunk {
                        let mut dose = create_test_dose(&id);
                        dose.apply(DoseAction::Skip { notes: None });
                        sink.append(&dose).unwrap();
                    }
                })
            })
            .collect();

        let compactor = {
            let wal_path = wal_path.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    compact(&wal_path).unwrap();
                }
            })
        };

        for handle in writers {
            handle.join().unwrap();
        }
        compactor.join().unwrap();

        let doses = read_doses(&wal_path).unwrap();
        assert_eq!(doses.len(), 40);
        assert!(doses.iter().all(|d| d.status == DoseStatus::Skipped));
    }
}
