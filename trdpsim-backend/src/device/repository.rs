//! Content-addressed store of validated device profiles.
//!
//! Profiles are copied into the repository root as `<id>.xml` and described
//! in `manifest.db`. Registering a document whose checksum is already known
//! returns the existing id instead of storing a second copy.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use trdpsim_shared::{DeviceProfileRecord, SimError, SimResult};

use super::validator::ProfileValidator;
use crate::manifest::{FileManifest, ManifestRecord, ManifestStore};
use crate::utils::error_handling::remove_file_quietly;
use crate::utils::{checksum_file, naming, time};

pub const MANIFEST_FILE: &str = "manifest.db";
const FALLBACK_ID: &str = "device";

pub struct DeviceProfileRepository {
    root: PathBuf,
    validator: Box<dyn ProfileValidator>,
    store: Box<dyn ManifestStore<DeviceProfileRecord>>,
    records: BTreeMap<String, DeviceProfileRecord>,
}

impl DeviceProfileRepository {
    /// Open the repository at `root`, creating it if needed
    pub fn open(root: impl Into<PathBuf>, validator: impl ProfileValidator + 'static) -> SimResult<Self> {
        let root = root.into();
        let store = FileManifest::new(root.join(MANIFEST_FILE));
        Self::with_store(root, validator, store)
    }

    /// Open the repository with an explicit manifest backend
    pub fn with_store(
        root: impl Into<PathBuf>,
        validator: impl ProfileValidator + 'static,
        store: impl ManifestStore<DeviceProfileRecord> + 'static,
    ) -> SimResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| SimError::io(&root, e))?;

        let records = store
            .load()?
            .into_iter()
            .filter(|record| !record.id.is_empty())
            .map(|record| (record.key().to_string(), record))
            .collect::<BTreeMap<_, _>>();

        debug!(
            "Opened device repository at {} with {} profiles",
            root.display(),
            records.len()
        );

        Ok(Self {
            root,
            validator: Box::new(validator),
            store: Box::new(store),
            records,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate and store a device profile, returning its id.
    ///
    /// Identical content registered earlier yields the earlier id. A document
    /// that fails validation leaves neither a stored copy nor a record.
    #[instrument(skip(self), fields(source = %source.display()))]
    pub fn register_profile(&mut self, source: &Path) -> SimResult<String> {
        if !source.is_file() {
            return Err(SimError::invalid_argument(format!(
                "XML file does not exist: {}",
                source.display()
            )));
        }

        let checksum = checksum_file(source)?;
        if let Some(existing) = self.records.values().find(|r| r.checksum == checksum) {
            info!(
                "Profile {} matches registered profile '{}'",
                source.display(),
                existing.id
            );
            return Ok(existing.id.clone());
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base = naming::sanitize_id(&stem, FALLBACK_ID);
        let id = naming::unique_id(&base, |candidate| self.records.contains_key(candidate));

        let stored_path = self.root.join(format!("{}.xml", id));
        fs::copy(source, &stored_path).map_err(|e| SimError::io(&stored_path, e))?;

        let validation = match self.validator.validate(&stored_path) {
            Ok(validation) => validation,
            Err(err) => {
                warn!("Validator failed for {}: {}", stored_path.display(), err);
                remove_file_quietly(&stored_path);
                return Err(err);
            }
        };
        if !validation.success {
            remove_file_quietly(&stored_path);
            return Err(SimError::validation(format!(
                "XML validation failed: {}",
                validation.message
            )));
        }

        let source_path = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        let record = DeviceProfileRecord {
            id: id.clone(),
            stored_path,
            source_path,
            checksum,
            validated_at: time::now_iso(),
        };

        self.records.insert(id.clone(), record);
        self.persist()?;

        info!("Registered device profile '{}'", id);
        Ok(id)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> SimResult<DeviceProfileRecord> {
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| SimError::not_found("Device profile", id))
    }

    /// All profiles, ordered by id
    pub fn list(&self) -> Vec<DeviceProfileRecord> {
        self.records.values().cloned().collect()
    }

    /// Update a profile's validation timestamp
    #[instrument(skip(self))]
    pub fn mark_validated(&mut self, id: &str, timestamp: &str) -> SimResult<()> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| SimError::not_found("Device profile", id))?;
        record.validated_at = timestamp.to_string();
        self.persist()
    }

    fn persist(&self) -> SimResult<()> {
        let records: Vec<DeviceProfileRecord> = self.records.values().cloned().collect();
        self.store.persist(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::validator::ProfileValidation;
    use crate::manifest::MemoryManifest;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct StubValidator {
        accept: bool,
        calls: Rc<Cell<usize>>,
    }

    impl StubValidator {
        fn accepting() -> Self {
            Self {
                accept: true,
                calls: Rc::new(Cell::new(0)),
            }
        }

        fn rejecting() -> Self {
            Self {
                accept: false,
                calls: Rc::new(Cell::new(0)),
            }
        }
    }

    impl ProfileValidator for StubValidator {
        fn validate(&self, _document: &Path) -> SimResult<ProfileValidation> {
            self.calls.set(self.calls.get() + 1);
            if self.accept {
                Ok(ProfileValidation::valid())
            } else {
                Ok(ProfileValidation::invalid("element 'device' is not expected"))
            }
        }
    }

    struct BrokenValidator;

    impl ProfileValidator for BrokenValidator {
        fn validate(&self, _document: &Path) -> SimResult<ProfileValidation> {
            Err(SimError::ValidatorUnavailable {
                message: "no schema".to_string(),
            })
        }
    }

    fn write_source(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_register_profile_stores_copy_and_record() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("devices");
        let source = write_source(temp_dir.path(), "Brake Unit.xml", "<device id=\"brake\"/>");

        let mut repo = DeviceProfileRepository::open(&root, StubValidator::accepting()).unwrap();
        let id = repo.register_profile(&source).unwrap();

        assert_eq!(id, "brake-unit");
        let record = repo.get(&id).unwrap();
        assert_eq!(record.stored_path, root.join("brake-unit.xml"));
        assert!(record.stored_path.exists());
        assert_eq!(record.checksum.len(), 16);
        assert!(root.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_identical_content_is_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("devices");
        let first = write_source(temp_dir.path(), "a.xml", "<device/>");
        let second = write_source(temp_dir.path(), "b.xml", "<device/>");

        let validator = StubValidator::accepting();
        let calls = Rc::clone(&validator.calls);
        let mut repo = DeviceProfileRepository::open(&root, validator).unwrap();

        let id1 = repo.register_profile(&first).unwrap();
        let id2 = repo.register_profile(&second).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(repo.list().len(), 1);
        assert_eq!(calls.get(), 1);
        assert!(!root.join("b.xml").exists());
    }

    #[test]
    fn test_colliding_names_get_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("devices");
        fs::create_dir_all(temp_dir.path().join("other")).unwrap();
        let first = write_source(temp_dir.path(), "door.xml", "<device n=\"1\"/>");
        let second = write_source(&temp_dir.path().join("other"), "door.xml", "<device n=\"2\"/>");

        let mut repo = DeviceProfileRepository::open(&root, StubValidator::accepting()).unwrap();
        assert_eq!(repo.register_profile(&first).unwrap(), "door");
        assert_eq!(repo.register_profile(&second).unwrap(), "door-2");
    }

    #[test]
    fn test_validation_failure_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("devices");
        let source = write_source(temp_dir.path(), "bad.xml", "<nope/>");

        let mut repo = DeviceProfileRepository::open(&root, StubValidator::rejecting()).unwrap();
        let err = repo.register_profile(&source).unwrap_err();

        match err {
            SimError::Validation { message } => assert!(message.contains("not expected")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(repo.list().is_empty());
        assert!(!root.join("bad.xml").exists());
    }

    #[test]
    fn test_validator_error_removes_copy() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("devices");
        let source = write_source(temp_dir.path(), "x.xml", "<device/>");

        let mut repo = DeviceProfileRepository::open(&root, BrokenValidator).unwrap();
        let err = repo.register_profile(&source).unwrap_err();

        assert!(matches!(err, SimError::ValidatorUnavailable { .. }));
        assert!(!root.join("x.xml").exists());
        assert!(!repo.exists("x"));
    }

    #[test]
    fn test_missing_source_is_invalid_argument() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo =
            DeviceProfileRepository::open(temp_dir.path(), StubValidator::accepting()).unwrap();
        let err = repo
            .register_profile(&temp_dir.path().join("missing.xml"))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument { .. }));
    }

    #[test]
    fn test_manifest_reload() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("devices");
        let source = write_source(temp_dir.path(), "speed.xml", "<device/>");

        {
            let mut repo =
                DeviceProfileRepository::open(&root, StubValidator::accepting()).unwrap();
            repo.register_profile(&source).unwrap();
        }

        let repo = DeviceProfileRepository::open(&root, StubValidator::accepting()).unwrap();
        assert!(repo.exists("speed"));
        assert_eq!(repo.list().len(), 1);
    }

    #[test]
    fn test_mark_validated() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryManifest::new();
        let observer = store.clone();
        let source = write_source(temp_dir.path(), "speed.xml", "<device/>");

        let mut repo = DeviceProfileRepository::with_store(
            temp_dir.path().join("devices"),
            StubValidator::accepting(),
            store,
        )
        .unwrap();
        let id = repo.register_profile(&source).unwrap();

        repo.mark_validated(&id, "2030-01-01T00:00:00Z").unwrap();
        assert_eq!(repo.get(&id).unwrap().validated_at, "2030-01-01T00:00:00Z");
        assert_eq!(observer.snapshot()[0].validated_at, "2030-01-01T00:00:00Z");

        let err = repo.mark_validated("ghost", "2030-01-01T00:00:00Z").unwrap_err();
        assert!(matches!(err, SimError::NotFound { .. }));
    }

    #[test]
    fn test_existing_manifest_records_are_indexed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("devices");
        let seeded = |id: &str| DeviceProfileRecord {
            id: id.to_string(),
            stored_path: root.join(format!("{}.xml", id)),
            source_path: PathBuf::from("/import/door.xml"),
            checksum: "0000000000000000".to_string(),
            validated_at: "2024-05-01T12:00:00Z".to_string(),
        };
        let store = MemoryManifest::with_records(vec![seeded("door"), seeded("")]);

        let mut repo =
            DeviceProfileRepository::with_store(&root, StubValidator::accepting(), store).unwrap();
        assert!(repo.exists("door"));
        assert_eq!(repo.list().len(), 1);

        let source = write_source(temp_dir.path(), "door.xml", "<device/>");
        assert_eq!(repo.register_profile(&source).unwrap(), "door-2");
    }
}
