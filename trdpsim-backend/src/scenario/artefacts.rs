//! Per-run artefact bundle.
//!
//! Each run with an artefact root gets its own directory:
//!
//! ```text
//! <root>/<scenario>-<YYYYMMDDTHHMMSSZ>/
//!     scenario.yaml      rendered copy of the executed scenario
//!     events.log         one line per dispatched event
//!     telemetry.log      endpoint telemetry
//!     diagnostics.log    endpoint diagnostics
//!     metadata.yaml      run summary
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use trdpsim_shared::scenario_text::render_scenario;
use trdpsim_shared::{DiagnosticEvent, Scenario, SimError, SimResult};

use crate::utils::{compact_timestamp, naming};

pub const SCENARIO_FILE: &str = "scenario.yaml";
pub const EVENTS_FILE: &str = "events.log";
pub const TELEMETRY_FILE: &str = "telemetry.log";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.log";
pub const METADATA_FILE: &str = "metadata.yaml";

/// Summary written to `metadata.yaml`
#[derive(Debug, Clone)]
pub struct RunMetadata<'a> {
    pub scenario_id: &'a str,
    pub device_profile_id: &'a str,
    pub run_id: &'a str,
    pub started_at: &'a str,
    pub completed_at: &'a str,
    pub success: bool,
    pub detail: &'a str,
}

impl RunMetadata<'_> {
    fn render(&self) -> String {
        format!(
            "scenario: {}\ndevice: {}\nrun: {}\nstarted_at: {}\ncompleted_at: {}\nsuccess: {}\ndetail: \"{}\"\n",
            self.scenario_id,
            self.device_profile_id,
            self.run_id,
            self.started_at,
            self.completed_at,
            self.success,
            self.detail
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', " ")
        )
    }
}

/// Directory name for a run: sanitized scenario id plus a compact UTC stamp
pub fn run_name(scenario_id: &str, started: DateTime<Utc>) -> String {
    format!(
        "{}-{}",
        naming::sanitize_id(scenario_id, "scenario"),
        compact_timestamp(started)
    )
}

/// Open run directory with its event log
#[derive(Debug)]
pub struct RunArtefacts {
    run_id: String,
    dir: PathBuf,
    events: BufWriter<File>,
}

impl RunArtefacts {
    /// Create the run directory and write the scenario snapshot.
    ///
    /// The run id avoids existing directories under `root` and any id
    /// `taken` reports.
    pub fn create(
        root: &Path,
        scenario: &Scenario,
        started: DateTime<Utc>,
        taken: impl Fn(&str) -> bool,
    ) -> SimResult<Self> {
        fs::create_dir_all(root).map_err(|e| SimError::io(root, e))?;

        let base = run_name(&scenario.id, started);
        let run_id = naming::unique_id(&base, |candidate| {
            taken(candidate) || root.join(candidate).exists()
        });
        let dir = root.join(&run_id);
        fs::create_dir(&dir).map_err(|e| SimError::io(&dir, e))?;

        let snapshot = dir.join(SCENARIO_FILE);
        fs::write(&snapshot, render_scenario(scenario)).map_err(|e| SimError::io(&snapshot, e))?;

        let events_path = dir.join(EVENTS_FILE);
        let events = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_path)
            .map_err(|e| SimError::io(&events_path, e))?;

        debug!("Created run directory {}", dir.display());
        Ok(Self {
            run_id,
            dir,
            events: BufWriter::new(events),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_event(&mut self, line: &str) -> SimResult<()> {
        writeln!(self.events, "{}", line).map_err(|e| SimError::io(self.dir.join(EVENTS_FILE), e))
    }

    /// Flush the event log and write the closing files
    pub fn finish(
        mut self,
        telemetry: &[String],
        diagnostics: &[DiagnosticEvent],
        metadata: &RunMetadata<'_>,
    ) -> SimResult<PathBuf> {
        self.events
            .flush()
            .map_err(|e| SimError::io(self.dir.join(EVENTS_FILE), e))?;

        write_lines(&self.dir.join(TELEMETRY_FILE), telemetry.iter())?;
        write_lines(&self.dir.join(DIAGNOSTICS_FILE), diagnostics.iter())?;

        let metadata_path = self.dir.join(METADATA_FILE);
        fs::write(&metadata_path, metadata.render()).map_err(|e| SimError::io(&metadata_path, e))?;

        Ok(self.dir)
    }
}

fn write_lines<T: std::fmt::Display>(
    path: &Path,
    lines: impl Iterator<Item = T>,
) -> SimResult<()> {
    let mut content = String::new();
    for line in lines {
        content.push_str(&line.to_string());
        content.push('\n');
    }
    fs::write(path, content).map_err(|e| SimError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use trdpsim_shared::{DiagnosticLevel, EventKind, ScenarioEvent};

    fn scenario() -> Scenario {
        Scenario {
            id: "Door-Cycle".to_string(),
            device_profile_id: "brake-unit".to_string(),
            events: vec![ScenarioEvent::new(EventKind::ProcessData, "speed", 1000)],
        }
    }

    #[test]
    fn test_run_name() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(run_name("Door-Cycle", at), "door-cycle-20240501T120000Z");
    }

    #[test]
    fn test_create_and_finish_bundle() {
        let temp_dir = TempDir::new().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let mut bundle = RunArtefacts::create(temp_dir.path(), &scenario(), at, |_| false).unwrap();
        bundle.log_event("pd::speed::comId=1000::dataset=0::bytes=0::delayMs=0").unwrap();
        let run_id = bundle.run_id().to_string();

        let metadata = RunMetadata {
            scenario_id: "Door-Cycle",
            device_profile_id: "brake-unit",
            run_id: &run_id,
            started_at: "2024-05-01T12:00:00Z",
            completed_at: "2024-05-01T12:00:01Z",
            success: false,
            detail: "said \"no\"",
        };
        let diagnostics = vec![DiagnosticEvent {
            timestamp: "2024-05-01 12:00:00".to_string(),
            level: DiagnosticLevel::Info,
            message: "close".to_string(),
        }];
        let dir = bundle
            .finish(&["ts | close".to_string()], &diagnostics, &metadata)
            .unwrap();

        for file in [SCENARIO_FILE, EVENTS_FILE, TELEMETRY_FILE, DIAGNOSTICS_FILE, METADATA_FILE] {
            assert!(dir.join(file).exists(), "missing {}", file);
        }
        let events = fs::read_to_string(dir.join(EVENTS_FILE)).unwrap();
        assert_eq!(events.lines().count(), 1);
        let diagnostics = fs::read_to_string(dir.join(DIAGNOSTICS_FILE)).unwrap();
        assert_eq!(diagnostics, "2024-05-01 12:00:00 [INFO] close\n");
        let metadata = fs::read_to_string(dir.join(METADATA_FILE)).unwrap();
        assert!(metadata.contains("success: false\n"));
        assert!(metadata.contains("detail: \"said \\\"no\\\"\"\n"));
    }

    #[test]
    fn test_colliding_run_directory_gets_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let first = RunArtefacts::create(temp_dir.path(), &scenario(), at, |_| false).unwrap();
        let second = RunArtefacts::create(temp_dir.path(), &scenario(), at, |_| false).unwrap();

        assert_eq!(first.run_id(), "door-cycle-20240501T120000Z");
        assert_eq!(second.run_id(), "door-cycle-20240501T120000Z-2");
    }

    #[test]
    fn test_taken_ids_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let bundle = RunArtefacts::create(temp_dir.path(), &scenario(), at, |candidate| {
            candidate == "door-cycle-20240501T120000Z"
        })
        .unwrap();

        assert_eq!(bundle.run_id(), "door-cycle-20240501T120000Z-2");
        assert!(!temp_dir.path().join("door-cycle-20240501T120000Z").exists());
    }
}
