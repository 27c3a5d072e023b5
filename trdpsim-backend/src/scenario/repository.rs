//! Scenario repository and run history.
//!
//! Imported scenarios are validated, parsed against the registered device
//! profiles and copied into the repository root as `<id>.yaml`. The scenario
//! manifest lives in `manifest.db`, the run history in `runs.db`.
//!
//! Loading a scenario always re-reads, re-validates and re-parses the stored
//! document; nothing parsed is cached between calls.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use trdpsim_shared::{RunRecord, Scenario, ScenarioRecord, SimError, SimResult};

use super::artefacts::SCENARIO_FILE;
use super::execution::RunRecorder;
use super::parser;
use super::schema::ScenarioSchemaValidator;
use crate::device::DeviceProfileRepository;
use crate::manifest::{FileManifest, ManifestRecord, ManifestStore};
use crate::utils::{checksum_file, naming, now_iso};

pub const MANIFEST_FILE: &str = "manifest.db";
pub const RUNS_FILE: &str = "runs.db";
const FALLBACK_ID: &str = "scenario";
const SCENARIO_EXTENSION: &str = "yaml";
const EXPORT_DEVICE_DIR: &str = "devices";

pub struct ScenarioRepository<'d> {
    root: PathBuf,
    validator: ScenarioSchemaValidator,
    devices: &'d DeviceProfileRepository,
    store: Box<dyn ManifestStore<ScenarioRecord>>,
    run_store: Box<dyn ManifestStore<RunRecord>>,
    records: BTreeMap<String, ScenarioRecord>,
    runs: BTreeMap<String, RunRecord>,
}

impl<'d> ScenarioRepository<'d> {
    /// Open the repository at `root` with file-backed manifests
    pub fn open(
        root: impl Into<PathBuf>,
        validator: ScenarioSchemaValidator,
        devices: &'d DeviceProfileRepository,
    ) -> SimResult<Self> {
        let root = root.into();
        let store = FileManifest::new(root.join(MANIFEST_FILE));
        let run_store = FileManifest::new(root.join(RUNS_FILE));
        Self::with_stores(root, validator, devices, store, run_store)
    }

    pub fn with_stores(
        root: impl Into<PathBuf>,
        validator: ScenarioSchemaValidator,
        devices: &'d DeviceProfileRepository,
        store: impl ManifestStore<ScenarioRecord> + 'static,
        run_store: impl ManifestStore<RunRecord> + 'static,
    ) -> SimResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| SimError::io(&root, e))?;

        let records = index(store.load()?);
        let runs = index(run_store.load()?);
        debug!(
            "Opened scenario repository at {} ({} scenarios, {} runs)",
            root.display(),
            records.len(),
            runs.len()
        );

        Ok(Self {
            root,
            validator,
            devices,
            store: Box::new(store),
            run_store: Box::new(run_store),
            records,
            runs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn devices(&self) -> &DeviceProfileRepository {
        self.devices
    }

    /// Validate, parse and store a scenario document, returning its id.
    ///
    /// Re-importing an id replaces the stored document and keeps the
    /// original creation time.
    #[instrument(skip(self), fields(source = %source.display()))]
    pub fn import_scenario(&mut self, source: &Path) -> SimResult<String> {
        let scenario = self.read_scenario_file(source)?;

        let id = naming::sanitize_id(&scenario.id, FALLBACK_ID);
        let stored_path = self.root.join(format!("{}.{}", id, SCENARIO_EXTENSION));
        if !same_file(source, &stored_path) {
            fs::copy(source, &stored_path).map_err(|e| SimError::io(&stored_path, e))?;
        }
        let checksum = checksum_file(&stored_path)?;

        let now = now_iso();
        let created_at = self
            .records
            .get(&id)
            .map(|existing| existing.created_at.clone())
            .unwrap_or_else(|| now.clone());

        let record = ScenarioRecord {
            id: id.clone(),
            device_profile_id: scenario.device_profile_id,
            stored_path,
            checksum,
            created_at,
            updated_at: now,
        };
        self.records.insert(id.clone(), record);
        self.persist_scenarios()?;

        info!("Imported scenario '{}'", id);
        Ok(id)
    }

    /// Validate and parse a scenario document without importing it
    pub fn read_scenario_file(&self, source: &Path) -> SimResult<Scenario> {
        if !source.is_file() {
            return Err(SimError::invalid_argument(format!(
                "Scenario file does not exist: {}",
                source.display()
            )));
        }
        self.validator.validate_file(source)?;
        parser::parse_file(source, self.devices)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> SimResult<ScenarioRecord> {
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| SimError::not_found("Scenario", id))
    }

    /// All scenarios, ordered by id
    pub fn list(&self) -> Vec<ScenarioRecord> {
        self.records.values().cloned().collect()
    }

    /// Re-validate and parse the stored copy of a scenario
    pub fn load(&self, id: &str) -> SimResult<Scenario> {
        let record = self.get(id)?;
        self.validator.validate_file(&record.stored_path)?;
        let mut scenario = parser::parse_file(&record.stored_path, self.devices)?;
        scenario.id = record.id;
        Ok(scenario)
    }

    /// Copy a stored scenario, and its device profile, out of the repository.
    ///
    /// An existing directory receives the stored file name; a path without
    /// extension gets `.yaml` appended. The device profile is written to
    /// `devices/<device>.xml` next to the exported document.
    #[instrument(skip(self), fields(destination = %destination.display()))]
    pub fn export_scenario(&self, id: &str, destination: &Path) -> SimResult<PathBuf> {
        let record = self.get(id)?;

        let target = if destination.is_dir() {
            let name = record
                .stored_path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| format!("{}.{}", record.id, SCENARIO_EXTENSION).into());
            destination.join(name)
        } else if destination.extension().is_none() {
            destination.with_extension(SCENARIO_EXTENSION)
        } else {
            destination.to_path_buf()
        };

        let target_dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if same_file(&record.stored_path, &target) {
            return Err(SimError::invalid_argument(format!(
                "Export destination is the stored copy of scenario '{}': {}",
                record.id,
                target.display()
            )));
        }
        fs::create_dir_all(&target_dir).map_err(|e| SimError::io(&target_dir, e))?;
        fs::copy(&record.stored_path, &target).map_err(|e| SimError::io(&target, e))?;

        match self.devices.get(&record.device_profile_id) {
            Ok(device) => {
                let device_dir = target_dir.join(EXPORT_DEVICE_DIR);
                fs::create_dir_all(&device_dir).map_err(|e| SimError::io(&device_dir, e))?;
                let device_target = device_dir.join(format!("{}.xml", device.id));
                if same_file(&device.stored_path, &device_target) {
                    debug!("Device profile '{}' already at {}", device.id, device_target.display());
                } else {
                    fs::copy(&device.stored_path, &device_target)
                        .map_err(|e| SimError::io(&device_target, e))?;
                }
            }
            Err(_) => warn!(
                "Scenario '{}' references unregistered device '{}'; exported without it",
                record.id, record.device_profile_id
            ),
        }

        info!("Exported scenario '{}' to {}", record.id, target.display());
        Ok(target)
    }

    /// Append or replace a run in the history
    pub fn record_run(&mut self, mut record: RunRecord) -> SimResult<()> {
        if record.id.is_empty() {
            return Err(SimError::invalid_argument("Run id cannot be empty"));
        }
        if record.completed_at.is_empty() {
            record.completed_at = record.started_at.clone();
        }
        debug!("Recording run '{}' (success={})", record.id, record.success);
        self.runs.insert(record.id.clone(), record);
        self.persist_runs()
    }

    /// All runs, oldest first
    pub fn list_runs(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self.runs.values().cloned().collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        runs
    }

    pub fn list_runs_for_scenario(&self, scenario_id: &str) -> Vec<RunRecord> {
        self.list_runs()
            .into_iter()
            .filter(|run| run.scenario_id == scenario_id)
            .collect()
    }

    pub fn get_run(&self, id: &str) -> SimResult<RunRecord> {
        self.runs
            .get(id)
            .cloned()
            .ok_or_else(|| SimError::not_found("Run", id))
    }

    /// Parse the scenario snapshot kept in a run's artefact directory
    pub fn load_run_scenario(&self, run_id: &str) -> SimResult<Scenario> {
        let run = self.get_run(run_id)?;
        parser::parse_file(&run.artefact_path.join(SCENARIO_FILE), self.devices)
    }

    fn persist_scenarios(&self) -> SimResult<()> {
        let records: Vec<ScenarioRecord> = self.records.values().cloned().collect();
        self.store.persist(&records)
    }

    fn persist_runs(&self) -> SimResult<()> {
        self.run_store.persist(&self.list_runs())
    }
}

impl RunRecorder for ScenarioRepository<'_> {
    fn record_run(&mut self, record: RunRecord) -> SimResult<()> {
        ScenarioRepository::record_run(self, record)
    }

    fn has_run(&self, run_id: &str) -> bool {
        self.runs.contains_key(run_id)
    }
}

fn index<R: ManifestRecord>(records: Vec<R>) -> BTreeMap<String, R> {
    records
        .into_iter()
        .filter(|record| !record.key().is_empty())
        .map(|record| (record.key().to_string(), record))
        .collect()
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ProfileValidation, ProfileValidator};
    use crate::manifest::MemoryManifest;
    use tempfile::TempDir;

    struct AcceptAll;

    impl ProfileValidator for AcceptAll {
        fn validate(&self, _document: &Path) -> SimResult<ProfileValidation> {
            Ok(ProfileValidation::valid())
        }
    }

    fn devices(temp_dir: &TempDir) -> DeviceProfileRepository {
        let source = temp_dir.path().join("brake-unit.xml");
        fs::write(&source, "<device id=\"brake\"/>").unwrap();
        let mut repo =
            DeviceProfileRepository::open(temp_dir.path().join("devices"), AcceptAll).unwrap();
        repo.register_profile(&source).unwrap();
        repo
    }

    fn write_scenario(dir: &Path, name: &str, id: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(
            &path,
            format!(
                "scenario: {}\ndevice: brake-unit\nevents:\n  - type: pd\n    label: speed\n    com_id: 1000\n",
                id
            ),
        )
        .unwrap();
        path
    }

    fn validator() -> ScenarioSchemaValidator {
        ScenarioSchemaValidator::with_defaults().unwrap()
    }

    #[test]
    fn test_import_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let devices = devices(&temp_dir);
        let mut repo =
            ScenarioRepository::open(temp_dir.path().join("scenarios"), validator(), &devices)
                .unwrap();
        let source = write_scenario(temp_dir.path(), "input.yaml", "Door-Cycle");

        let id = repo.import_scenario(&source).unwrap();
        assert_eq!(id, "door-cycle");

        let record = repo.get(&id).unwrap();
        assert_eq!(record.device_profile_id, "brake-unit");
        assert_eq!(record.created_at, record.updated_at);
        assert!(record.stored_path.ends_with("door-cycle.yaml"));

        let scenario = repo.load(&id).unwrap();
        assert_eq!(scenario.id, "door-cycle");
        assert_eq!(scenario.events.len(), 1);
    }

    #[test]
    fn test_import_rejects_unknown_device() {
        let temp_dir = TempDir::new().unwrap();
        let devices = devices(&temp_dir);
        let mut repo =
            ScenarioRepository::open(temp_dir.path().join("scenarios"), validator(), &devices)
                .unwrap();
        let source = temp_dir.path().join("ghost.yaml");
        fs::write(&source, "scenario: ghost\ndevice: nobody\nevents:\n - type: pd\n   label: a\n")
            .unwrap();

        let err = repo.import_scenario(&source).unwrap_err();
        assert!(matches!(err, SimError::Validation { .. }));
        assert!(repo.list().is_empty());
        assert!(!temp_dir.path().join("scenarios/ghost.yaml").exists());
    }

    #[test]
    fn test_reimport_from_stored_copy() {
        let temp_dir = TempDir::new().unwrap();
        let devices = devices(&temp_dir);
        let mut repo =
            ScenarioRepository::open(temp_dir.path().join("scenarios"), validator(), &devices)
                .unwrap();
        let source = write_scenario(temp_dir.path(), "input.yaml", "loop");
        let id = repo.import_scenario(&source).unwrap();

        let stored = repo.get(&id).unwrap().stored_path;
        assert_eq!(repo.import_scenario(&stored).unwrap(), id);
        assert!(stored.exists());
    }

    #[test]
    fn test_load_sees_on_disk_changes() {
        let temp_dir = TempDir::new().unwrap();
        let devices = devices(&temp_dir);
        let mut repo =
            ScenarioRepository::open(temp_dir.path().join("scenarios"), validator(), &devices)
                .unwrap();
        let source = write_scenario(temp_dir.path(), "input.yaml", "fresh");
        let id = repo.import_scenario(&source).unwrap();

        let stored = repo.get(&id).unwrap().stored_path;
        let mut text = fs::read_to_string(&stored).unwrap();
        text.push_str("  - type: md\n    label: door\n");
        fs::write(&stored, text).unwrap();
        assert_eq!(repo.load(&id).unwrap().events.len(), 2);

        fs::write(&stored, "scenario: fresh\n").unwrap();
        assert!(matches!(repo.load(&id), Err(SimError::Validation { .. })));
    }

    #[test]
    fn test_unknown_ids() {
        let temp_dir = TempDir::new().unwrap();
        let devices = devices(&temp_dir);
        let repo =
            ScenarioRepository::open(temp_dir.path().join("scenarios"), validator(), &devices)
                .unwrap();

        assert!(matches!(repo.load("nope"), Err(SimError::NotFound { .. })));
        assert!(matches!(repo.get_run("nope"), Err(SimError::NotFound { .. })));
        assert!(matches!(
            repo.export_scenario("nope", temp_dir.path()),
            Err(SimError::NotFound { .. })
        ));
    }

    #[test]
    fn test_record_run_defaults_and_ordering() {
        let temp_dir = TempDir::new().unwrap();
        let devices = devices(&temp_dir);
        let run_store = MemoryManifest::new();
        let observer = run_store.clone();
        let mut repo = ScenarioRepository::with_stores(
            temp_dir.path().join("scenarios"),
            validator(),
            &devices,
            MemoryManifest::new(),
            run_store,
        )
        .unwrap();

        let run = |id: &str, scenario: &str, started: &str| RunRecord {
            id: id.to_string(),
            scenario_id: scenario.to_string(),
            artefact_path: PathBuf::new(),
            started_at: started.to_string(),
            completed_at: String::new(),
            success: true,
            detail: String::new(),
        };

        repo.record_run(run("b", "door", "2024-05-01T12:00:05Z")).unwrap();
        repo.record_run(run("a", "door", "2024-05-01T12:00:01Z")).unwrap();
        repo.record_run(run("c", "speed", "2024-05-01T12:00:03Z")).unwrap();

        let ids: Vec<String> = repo.list_runs().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(repo.list_runs_for_scenario("door").len(), 2);
        assert_eq!(
            repo.get_run("a").unwrap().completed_at,
            "2024-05-01T12:00:01Z"
        );
        assert_eq!(observer.snapshot().len(), 3);

        let err = repo.record_run(run("", "door", "x")).unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument { .. }));
    }

    #[test]
    fn test_export_onto_stored_copy_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let devices = devices(&temp_dir);
        let mut repo =
            ScenarioRepository::open(temp_dir.path().join("scenarios"), validator(), &devices)
                .unwrap();
        let source = write_scenario(temp_dir.path(), "input.yaml", "loop");
        let id = repo.import_scenario(&source).unwrap();
        let stored = repo.get(&id).unwrap().stored_path;
        let before = fs::read_to_string(&stored).unwrap();

        let err = repo.export_scenario(&id, repo.root()).unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument { .. }));
        let err = repo.export_scenario(&id, &stored).unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument { .. }));

        assert_eq!(fs::read_to_string(&stored).unwrap(), before);
        assert_eq!(repo.load(&id).unwrap().events.len(), 1);
    }

    #[test]
    fn test_export_next_to_stored_device_keeps_profile() {
        let temp_dir = TempDir::new().unwrap();
        let devices = devices(&temp_dir);
        let mut repo =
            ScenarioRepository::open(temp_dir.path().join("scenarios"), validator(), &devices)
                .unwrap();
        let id = repo
            .import_scenario(&write_scenario(temp_dir.path(), "input.yaml", "loop"))
            .unwrap();

        // devices/<id>.xml under the export directory is the stored profile itself
        let profile = devices.get("brake-unit").unwrap().stored_path;
        let profile_text = fs::read_to_string(&profile).unwrap();
        let exported = repo.export_scenario(&id, temp_dir.path()).unwrap();

        assert_eq!(exported, temp_dir.path().join("loop.yaml"));
        assert_eq!(fs::read_to_string(&profile).unwrap(), profile_text);
        assert_eq!(fs::read_to_string(&profile).unwrap(), "<device id=\"brake\"/>");
    }

    #[test]
    fn test_read_scenario_file_does_not_import() {
        let temp_dir = TempDir::new().unwrap();
        let devices = devices(&temp_dir);
        let repo =
            ScenarioRepository::open(temp_dir.path().join("scenarios"), validator(), &devices)
                .unwrap();
        let source = write_scenario(temp_dir.path(), "input.yaml", "Ad-Hoc");

        let scenario = repo.read_scenario_file(&source).unwrap();
        assert_eq!(scenario.id, "Ad-Hoc");
        assert_eq!(scenario.device_profile_id, "brake-unit");
        assert!(repo.list().is_empty());
        assert!(!repo.root().join("ad-hoc.yaml").exists());

        let err = repo
            .read_scenario_file(&temp_dir.path().join("missing.yaml"))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument { .. }));
    }
}
