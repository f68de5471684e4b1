//! Registry persistence with file locking.
//!
//! Drugs and medication schedules live in a single JSON document that is
//! rewritten atomically on every change. Unlike the dose journal, a registry
//! that cannot be read is an error: schedules are never silently dropped.

use crate::{Drug, Error, MedicationSchedule, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Reference drugs and the user's medication schedules
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Registry {
    #[serde(default)]
    pub drugs: Vec<Drug>,

    #[serde(default)]
    pub medications: Vec<MedicationSchedule>,
}

impl Registry {
    pub fn drug(&self, id: &str) -> Option<&Drug> {
        self.drugs.iter().find(|d| d.id == id)
    }

    /// Load the registry with shared locking
    ///
    /// Returns `None` if the file doesn't exist yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            tracing::info!("No registry found at {:?}", path);
            return Ok(None);
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let registry = serde_json::from_str::<Registry>(&contents).map_err(|e| {
            Error::State(format!("registry {:?} is unreadable: {}", path, e))
        })?;

        tracing::debug!(
            "Loaded registry from {:?}: {} drugs, {} medications",
            path,
            registry.drugs.len(),
            registry.medications.len()
        );
        Ok(Some(registry))
    }

    /// Save the registry with exclusive locking
    ///
    /// Atomically writes by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::State(format!("registry path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        // Temp file in the same directory so the rename stays atomic
        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved registry to {:?}", path);
        Ok(())
    }

    /// Load the registry, modify it, and save it back
    ///
    /// Nothing is written when `f` fails.
    pub fn update<T, F>(path: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut Registry) -> Result<T>,
    {
        let mut registry = Self::load(path)?.unwrap_or_default();
        let out = f(&mut registry)?;
        registry.save(path)?;
        Ok(out)
    }
}
