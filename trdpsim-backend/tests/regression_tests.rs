//! Regression tests for trdpsim-backend
//!
//! These tests pin down repository and engine behaviors that other tools
//! depend on: idempotent registration, import timestamps, the exact telemetry
//! sequence of a loopback run, acknowledgment failure handling and export
//! naming.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use trdpsim_backend::communication::{CommunicationEndpoint, LoopbackStack, TrdpSession};
use trdpsim_backend::device::{DeviceProfileRepository, ProfileValidation, ProfileValidator};
use trdpsim_backend::scenario::{ScenarioRepository, ScenarioSchemaValidator, SimulationEngine};
use trdpsim_shared::{
    EventKind, MessageDataAck, MessageDataStatus, Scenario, ScenarioEvent, SimError, SimResult,
};

struct FixedValidator {
    accept: bool,
}

impl ProfileValidator for FixedValidator {
    fn validate(&self, _document: &Path) -> SimResult<ProfileValidation> {
        if self.accept {
            Ok(ProfileValidation::valid())
        } else {
            Ok(ProfileValidation::invalid("element 'device' is not expected"))
        }
    }
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn registered_devices(temp_dir: &TempDir) -> DeviceProfileRepository {
    let mut repo =
        DeviceProfileRepository::open(temp_dir.path().join("devices"), FixedValidator { accept: true })
            .unwrap();
    let profile = write(temp_dir.path(), "brake-unit.xml", "<device/>");
    repo.register_profile(&profile).unwrap();
    repo
}

fn pd_md_pd() -> Scenario {
    Scenario {
        id: "pd-md-pd".to_string(),
        device_profile_id: "brake-unit".to_string(),
        events: vec![
            ScenarioEvent::new(EventKind::ProcessData, "speed", 1000).with_payload(vec![1, 2]),
            ScenarioEvent::new(EventKind::MessageData, "door", 2000).with_dataset(3),
            ScenarioEvent::new(EventKind::ProcessData, "speed", 1000),
        ],
    }
}

/// Device profile registration regression tests
#[cfg(test)]
mod device_registration_regression_tests {
    use super::*;

    #[test]
    fn test_identical_content_registers_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = registered_devices(&temp_dir);

        let copy = write(temp_dir.path(), "renamed-copy.xml", "<device/>");
        assert_eq!(repo.register_profile(&copy).unwrap(), "brake-unit");

        assert_eq!(repo.list().len(), 1);
        let stored: Vec<_> = fs::read_dir(temp_dir.path().join("devices"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "xml"))
            .collect();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_rejected_profile_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeviceProfileRepository::open(
            temp_dir.path().join("devices"),
            FixedValidator { accept: false },
        )
        .unwrap();
        let profile = write(temp_dir.path(), "broken.xml", "<nope/>");

        let err = repo.register_profile(&profile).unwrap_err();
        match err {
            SimError::Validation { message } => {
                assert!(message.starts_with("XML validation failed"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(repo.list().is_empty());
        assert!(!temp_dir.path().join("devices/broken.xml").exists());
    }
}

/// Scenario repository regression tests
#[cfg(test)]
mod scenario_repository_regression_tests {
    use super::*;

    const DOCUMENT: &str =
        "scenario: loop\ndevice: brake-unit\nevents:\n  - type: pd\n    label: speed\n";

    #[test]
    fn test_reimport_keeps_created_at() {
        let temp_dir = TempDir::new().unwrap();
        let devices = registered_devices(&temp_dir);
        let mut repo = ScenarioRepository::open(
            temp_dir.path().join("scenarios"),
            ScenarioSchemaValidator::with_defaults().unwrap(),
            &devices,
        )
        .unwrap();

        let source = write(temp_dir.path(), "loop.yaml", DOCUMENT);
        repo.import_scenario(&source).unwrap();
        let first = repo.get("loop").unwrap();

        // Timestamps have one-second resolution
        thread::sleep(Duration::from_millis(1100));
        write(
            temp_dir.path(),
            "loop.yaml",
            &format!("{}  - type: md\n    label: door\n", DOCUMENT),
        );
        repo.import_scenario(&source).unwrap();
        let second = repo.get("loop").unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_ne!(second.updated_at, first.updated_at);
        assert_ne!(second.checksum, first.checksum);
        assert_eq!(repo.list().len(), 1);
    }

    #[test]
    fn test_export_naming() {
        let temp_dir = TempDir::new().unwrap();
        let devices = registered_devices(&temp_dir);
        let mut repo = ScenarioRepository::open(
            temp_dir.path().join("scenarios"),
            ScenarioSchemaValidator::with_defaults().unwrap(),
            &devices,
        )
        .unwrap();
        repo.import_scenario(&write(temp_dir.path(), "loop.yaml", DOCUMENT))
            .unwrap();

        let existing_dir = temp_dir.path().join("out");
        fs::create_dir(&existing_dir).unwrap();
        assert_eq!(
            repo.export_scenario("loop", &existing_dir).unwrap(),
            existing_dir.join("loop.yaml")
        );

        let bare = temp_dir.path().join("named");
        let exported = repo.export_scenario("loop", &bare).unwrap();
        assert_eq!(exported, temp_dir.path().join("named.yaml"));
        assert!(exported.is_file());
    }

    #[test]
    fn test_numeric_payload_schema_rejects_text() {
        let validator =
            ScenarioSchemaValidator::from_document("numeric_event_fields: payload\n").unwrap();
        let err = validator
            .validate("scenario: a\ndevice: d\nevents:\n  - type: pd\n    label: x\n    payload: abc\n")
            .unwrap_err();
        assert!(matches!(err, SimError::Validation { .. }));

        validator
            .validate("scenario: a\ndevice: d\nevents:\n  - type: pd\n    label: x\n    payload: 42\n")
            .unwrap();
    }
}

/// Simulation engine regression tests
#[cfg(test)]
mod engine_regression_tests {
    use super::*;
    use trdpsim_backend::scenario::RunRecorder;
    use trdpsim_shared::RunRecord;

    #[derive(Default)]
    struct CollectingRecorder {
        runs: Vec<RunRecord>,
    }

    impl RunRecorder for CollectingRecorder {
        fn record_run(&mut self, record: RunRecord) -> SimResult<()> {
            self.runs.push(record);
            Ok(())
        }

        fn has_run(&self, run_id: &str) -> bool {
            self.runs.iter().any(|run| run.id == run_id)
        }
    }

    #[test]
    fn test_pd_md_pd_telemetry_sequence() {
        let mut session = TrdpSession::new("127.0.0.1", LoopbackStack::new());
        {
            let mut engine = SimulationEngine::new(&mut session);
            engine.load_scenario(pd_md_pd()).unwrap();
            engine.run().unwrap();
        }

        let messages: Vec<&str> = session
            .telemetry()
            .iter()
            .map(|line| line.split_once(" | ").map(|(_, msg)| msg).unwrap_or(""))
            .collect();
        assert_eq!(
            messages,
            vec![
                "open -> 127.0.0.1",
                "pd -> speed (comId=1000, dataset=0, bytes=2)",
                "pd <- speed (comId=1000, dataset=0, bytes=2)",
                "md -> door (comId=2000, dataset=3, bytes=0) | delivered - loopback",
                "md <- door (comId=2000, dataset=3, bytes=0)",
                "pd -> speed (comId=1000, dataset=0, bytes=0)",
                "pd <- speed (comId=1000, dataset=0, bytes=0)",
                "close",
            ]
        );
    }

    #[test]
    fn test_rejected_ack_records_failed_run() {
        let ack = MessageDataAck {
            status: MessageDataStatus::Failed,
            detail: "door jammed".to_string(),
        };
        let mut session = TrdpSession::new("127.0.0.1", LoopbackStack::new().with_ack("door", ack));
        let mut recorder = CollectingRecorder::default();

        let err = {
            let mut engine = SimulationEngine::new(&mut session).with_recorder(&mut recorder);
            engine.load_scenario(pd_md_pd()).unwrap();
            engine.run().unwrap_err()
        };

        assert!(matches!(err, SimError::AcknowledgmentRejected { .. }));
        assert_eq!(err.exit_code(), 5);
        assert_eq!(session.adapter().close_calls(), 1);
        assert!(!session.is_open());

        assert_eq!(recorder.runs.len(), 1);
        assert!(!recorder.runs[0].success);
        assert_eq!(recorder.runs[0].detail, "door jammed");
        assert!(
            !session
                .telemetry()
                .iter()
                .any(|line| line.contains("pd -> speed (comId=1000, dataset=0, bytes=0)"))
        );
    }

    #[test]
    fn test_runs_without_artefacts_are_never_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let devices = registered_devices(&temp_dir);
        let mut repo = ScenarioRepository::open(
            temp_dir.path().join("scenarios"),
            ScenarioSchemaValidator::with_defaults().unwrap(),
            &devices,
        )
        .unwrap();
        let mut session = TrdpSession::new("127.0.0.1", LoopbackStack::new());

        for _ in 0..2 {
            let mut engine = SimulationEngine::new(&mut session).with_recorder(&mut repo);
            engine.load_scenario(pd_md_pd()).unwrap();
            engine.run().unwrap();
        }

        let runs = repo.list_runs();
        assert_eq!(runs.len(), 2);
        assert_ne!(runs[0].id, runs[1].id);
        assert!(runs.iter().all(|run| run.success));
    }
}
