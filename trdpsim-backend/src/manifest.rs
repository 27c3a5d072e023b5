//! Manifest persistence for the repositories.
//!
//! Every repository keeps its records in a manifest: a text file with a `#`
//! header line followed by one pipe-delimited record per line. The whole file
//! is rewritten on every mutation and read once when a repository is opened.
//!
//! Record types describe their own columns through [`ManifestRecord`]; the
//! storage backend is a [`ManifestStore`], either [`FileManifest`] or the
//! in-memory [`MemoryManifest`] used by tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use trdpsim_shared::{DeviceProfileRecord, RunRecord, ScenarioRecord, SimError, SimResult};

/// A record that can be stored as one manifest line
pub trait ManifestRecord: Clone {
    /// Column names, written as the `#` header line
    const HEADER: &'static str;
    /// Lines with fewer fields are skipped on load
    const FIELD_COUNT: usize;

    fn key(&self) -> &str;
    fn to_fields(&self) -> Vec<String>;
    fn from_fields(fields: &[String]) -> Option<Self>;
}

/// Storage backend for a list of records
pub trait ManifestStore<R: ManifestRecord> {
    fn load(&self) -> SimResult<Vec<R>>;
    fn persist(&self, records: &[R]) -> SimResult<()>;
}

/// Pipe-delimited manifest file
#[derive(Debug, Clone)]
pub struct FileManifest {
    path: PathBuf,
}

impl FileManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<R: ManifestRecord> ManifestStore<R> for FileManifest {
    fn load(&self) -> SimResult<Vec<R>> {
        if !self.path.exists() {
            debug!("Manifest {} does not exist yet", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| SimError::io(&self.path, e))?;
        let mut records = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields = split_fields(line);
            if fields.len() < R::FIELD_COUNT {
                warn!(
                    "Skipping manifest line {} in {}: expected {} fields, found {}",
                    index + 1,
                    self.path.display(),
                    R::FIELD_COUNT,
                    fields.len()
                );
                continue;
            }
            match R::from_fields(&fields) {
                Some(record) => records.push(record),
                None => warn!(
                    "Skipping unreadable manifest line {} in {}",
                    index + 1,
                    self.path.display()
                ),
            }
        }

        debug!(
            "Loaded {} records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }

    fn persist(&self, records: &[R]) -> SimResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SimError::io(parent, e))?;
        }

        let mut content = format!("# {}\n", R::HEADER);
        for record in records {
            let line = record
                .to_fields()
                .iter()
                .map(|field| escape_field(field))
                .collect::<Vec<_>>()
                .join("|");
            content.push_str(&line);
            content.push('\n');
        }

        fs::write(&self.path, content).map_err(|e| SimError::io(&self.path, e))?;
        debug!(
            "Persisted {} records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Shared in-memory manifest; clones see the same records
#[derive(Debug)]
pub struct MemoryManifest<R> {
    records: Arc<Mutex<Vec<R>>>,
}

impl<R> Clone for MemoryManifest<R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<R> Default for MemoryManifest<R> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<R: Clone> MemoryManifest<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<R>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    /// Last persisted snapshot
    pub fn snapshot(&self) -> Vec<R> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl<R: ManifestRecord> ManifestStore<R> for MemoryManifest<R> {
    fn load(&self) -> SimResult<Vec<R>> {
        Ok(self.snapshot())
    }

    fn persist(&self, records: &[R]) -> SimResult<()> {
        let mut guard = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = records.to_vec();
        Ok(())
    }
}

fn escape_field(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '|' => escaped.push_str("\\|"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => current.push(other),
                None => current.push('\\'),
            },
            '|' => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

impl ManifestRecord for DeviceProfileRecord {
    const HEADER: &'static str = "id|storedPath|sourcePath|checksum|validatedAt";
    const FIELD_COUNT: usize = 5;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.stored_path.display().to_string(),
            self.source_path.display().to_string(),
            self.checksum.clone(),
            self.validated_at.clone(),
        ]
    }

    fn from_fields(fields: &[String]) -> Option<Self> {
        Some(Self {
            id: fields.first()?.clone(),
            stored_path: PathBuf::from(fields.get(1)?),
            source_path: PathBuf::from(fields.get(2)?),
            checksum: fields.get(3)?.clone(),
            validated_at: fields.get(4)?.clone(),
        })
    }
}

impl ManifestRecord for ScenarioRecord {
    const HEADER: &'static str = "id|storedPath|deviceProfileId|checksum|createdAt|updatedAt";
    const FIELD_COUNT: usize = 6;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.stored_path.display().to_string(),
            self.device_profile_id.clone(),
            self.checksum.clone(),
            self.created_at.clone(),
            self.updated_at.clone(),
        ]
    }

    fn from_fields(fields: &[String]) -> Option<Self> {
        Some(Self {
            id: fields.first()?.clone(),
            stored_path: PathBuf::from(fields.get(1)?),
            device_profile_id: fields.get(2)?.clone(),
            checksum: fields.get(3)?.clone(),
            created_at: fields.get(4)?.clone(),
            updated_at: fields.get(5)?.clone(),
        })
    }
}

impl ManifestRecord for RunRecord {
    const HEADER: &'static str =
        "id|scenarioId|artefactPath|startedAt|completedAt|success|detail";
    const FIELD_COUNT: usize = 7;

    fn key(&self) -> &str {
        &self.id
    }

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.scenario_id.clone(),
            self.artefact_path.display().to_string(),
            self.started_at.clone(),
            self.completed_at.clone(),
            if self.success { "1" } else { "0" }.to_string(),
            self.detail.clone(),
        ]
    }

    fn from_fields(fields: &[String]) -> Option<Self> {
        let success = match fields.get(5)?.as_str() {
            "1" | "true" => true,
            "0" | "false" => false,
            _ => return None,
        };
        Some(Self {
            id: fields.first()?.clone(),
            scenario_id: fields.get(1)?.clone(),
            artefact_path: PathBuf::from(fields.get(2)?),
            started_at: fields.get(3)?.clone(),
            completed_at: fields.get(4)?.clone(),
            success,
            detail: fields.get(6)?.clone(),
        })
    }
}
