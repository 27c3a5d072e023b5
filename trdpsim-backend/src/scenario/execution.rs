//! Scenario execution engine.
//!
//! The engine replays a loaded [`Scenario`] through a [`CommunicationEndpoint`]
//! one event at a time. Runs are strictly sequential and the only blocking
//! call is the inter-event delay.
//!
//! ```text
//!  Idle ──load──► Loaded ──run──► Running ──┬──► Completed ──┐
//!                                           └──► Failed ─────┴──► Idle
//! ```
//!
//! Every run that got past opening the endpoint ends with the same
//! finalization step: close the endpoint, write the artefact bundle, and
//! record a [`RunRecord`] when a recorder is attached.

use std::path::PathBuf;
use std::thread;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use trdpsim_shared::scenario_text::describe_event;
use trdpsim_shared::{EventKind, RunRecord, Scenario, SimError, SimResult};

use super::artefacts::{self, RunArtefacts, RunMetadata};
use crate::communication::CommunicationEndpoint;
use crate::utils::error_handling::log_cleanup_failure;
use crate::utils::{iso_timestamp, naming};

/// Sink for finished runs
pub trait RunRecorder {
    fn record_run(&mut self, record: RunRecord) -> SimResult<()>;

    /// Whether `run_id` is already in the history
    fn has_run(&self, run_id: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Idle,
    Loaded,
    Running,
    Completed,
    Failed,
}

/// Outcome of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub scenario_id: String,
    pub artefact_path: Option<PathBuf>,
    pub started_at: String,
    pub completed_at: String,
    pub success: bool,
    pub detail: String,
}

pub struct SimulationEngine<'a, E: CommunicationEndpoint> {
    endpoint: &'a mut E,
    artefact_root: Option<PathBuf>,
    recorder: Option<&'a mut dyn RunRecorder>,
    scenario: Option<Scenario>,
    state: EngineState,
    last_run: Option<RunSummary>,
}

impl<'a, E: CommunicationEndpoint> SimulationEngine<'a, E> {
    pub fn new(endpoint: &'a mut E) -> Self {
        Self {
            endpoint,
            artefact_root: None,
            recorder: None,
            scenario: None,
            state: EngineState::Idle,
            last_run: None,
        }
    }

    /// Write a bundle for every run under `root`
    pub fn with_artefact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artefact_root = Some(root.into());
        self
    }

    /// Append a [`RunRecord`] to `recorder` after every run
    pub fn with_recorder(mut self, recorder: &'a mut dyn RunRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn scenario(&self) -> Option<&Scenario> {
        self.scenario.as_ref()
    }

    pub fn last_run(&self) -> Option<&RunSummary> {
        self.last_run.as_ref()
    }

    pub fn endpoint(&self) -> &E {
        &*self.endpoint
    }

    /// Load a scenario, replacing any previously loaded one
    pub fn load_scenario(&mut self, scenario: Scenario) -> SimResult<()> {
        if scenario.events.is_empty() {
            return Err(SimError::invalid_argument(
                "Scenario must contain at least one event",
            ));
        }
        if scenario.device_profile_id.is_empty() {
            return Err(SimError::invalid_argument(
                "Scenario requires a device profile",
            ));
        }
        debug!(
            "Loaded scenario '{}' ({} events)",
            scenario.id,
            scenario.events.len()
        );
        self.scenario = Some(scenario);
        self.state = EngineState::Loaded;
        Ok(())
    }

    /// Execute the loaded scenario.
    ///
    /// On failure the endpoint is closed best-effort and the original error is
    /// returned after the run has been recorded.
    #[instrument(skip(self), fields(scenario = self.scenario.as_ref().map(|s| s.id.as_str()).unwrap_or("")))]
    pub fn run(&mut self) -> SimResult<RunSummary> {
        if self.state != EngineState::Loaded {
            return Err(SimError::logic("No scenario loaded"));
        }
        let scenario = self
            .scenario
            .take()
            .ok_or_else(|| SimError::logic("No scenario loaded"))?;

        if !self.endpoint.is_open()
            && let Err(err) = self.endpoint.open()
        {
            warn!("Failed to open endpoint for '{}': {}", scenario.id, err);
            self.scenario = Some(scenario);
            self.state = EngineState::Idle;
            return Err(err);
        }

        self.state = EngineState::Running;
        let started = Utc::now();
        info!(
            "Running scenario '{}' ({} events, {} ms of scheduled delay)",
            scenario.id,
            scenario.events.len(),
            scenario.total_delay().as_millis()
        );

        let recorded =
            |candidate: &str| self.recorder.as_deref().is_some_and(|r| r.has_run(candidate));
        let mut bundle = None;
        let (run_id, mut outcome) = match &self.artefact_root {
            Some(root) => match RunArtefacts::create(root, &scenario, started, recorded) {
                Ok(created) => {
                    let run_id = created.run_id().to_string();
                    bundle = Some(created);
                    (run_id, Ok(()))
                }
                Err(err) => (
                    naming::unique_id(&artefacts::run_name(&scenario.id, started), recorded),
                    Err(err),
                ),
            },
            None => (
                naming::unique_id(&artefacts::run_name(&scenario.id, started), recorded),
                Ok(()),
            ),
        };

        if outcome.is_ok() {
            outcome = self.dispatch_events(&scenario, bundle.as_mut());
        }

        let result = self.finish(&scenario, run_id, iso_timestamp(started), bundle, outcome);
        self.scenario = Some(scenario);
        self.state = EngineState::Idle;
        result
    }

    fn dispatch_events(
        &mut self,
        scenario: &Scenario,
        mut bundle: Option<&mut RunArtefacts>,
    ) -> SimResult<()> {
        for event in &scenario.events {
            if !event.delay.is_zero() {
                thread::sleep(event.delay);
            }

            let description = describe_event(event);
            debug!("Dispatching {}", description);
            if let Some(bundle) = bundle.as_deref_mut() {
                bundle.log_event(&description)?;
            }

            match event.kind {
                EventKind::ProcessData => {
                    self.endpoint.publish_process_data(&event.to_process_data())?;
                }
                EventKind::MessageData => {
                    let ack = self.endpoint.send_message_data(&event.to_message_data())?;
                    if !ack.is_delivered() {
                        return Err(SimError::AcknowledgmentRejected {
                            label: event.label.clone(),
                            status: ack.status,
                            detail: ack.detail,
                        });
                    }
                }
            }

            self.endpoint.poll()?;
        }
        Ok(())
    }

    /// Close the endpoint, write the bundle and record the run
    fn finish(
        &mut self,
        scenario: &Scenario,
        run_id: String,
        started_at: String,
        bundle: Option<RunArtefacts>,
        outcome: SimResult<()>,
    ) -> SimResult<RunSummary> {
        let mut outcome = match outcome {
            Ok(()) if self.endpoint.is_open() => self.endpoint.close(),
            Ok(()) => Ok(()),
            Err(err) => {
                if self.endpoint.is_open() {
                    log_cleanup_failure(self.endpoint.close(), "close endpoint");
                }
                Err(err)
            }
        };

        self.state = if outcome.is_ok() {
            EngineState::Completed
        } else {
            EngineState::Failed
        };

        let completed_at = iso_timestamp(Utc::now());
        let detail = outcome
            .as_ref()
            .err()
            .map(SimError::run_detail)
            .unwrap_or_default();

        let mut artefact_path = None;
        if let Some(bundle) = bundle {
            let metadata = RunMetadata {
                scenario_id: &scenario.id,
                device_profile_id: &scenario.device_profile_id,
                run_id: &run_id,
                started_at: &started_at,
                completed_at: &completed_at,
                success: outcome.is_ok(),
                detail: &detail,
            };
            let dir = bundle.dir().to_path_buf();
            match bundle.finish(self.endpoint.telemetry(), self.endpoint.diagnostics(), &metadata) {
                Ok(path) => artefact_path = Some(path),
                Err(err) => {
                    artefact_path = Some(dir);
                    if outcome.is_ok() {
                        outcome = Err(err);
                    } else {
                        warn!("Failed to finalize artefacts for '{}': {}", run_id, err);
                    }
                }
            }
        }

        let success = outcome.is_ok();
        let detail = outcome
            .as_ref()
            .err()
            .map(SimError::run_detail)
            .unwrap_or_default();
        let summary = RunSummary {
            run_id: run_id.clone(),
            scenario_id: scenario.id.clone(),
            artefact_path: artefact_path.clone(),
            started_at: started_at.clone(),
            completed_at: completed_at.clone(),
            success,
            detail: detail.clone(),
        };

        if let Some(recorder) = self.recorder.as_deref_mut() {
            let record = RunRecord {
                id: run_id,
                scenario_id: scenario.id.clone(),
                artefact_path: artefact_path.unwrap_or_default(),
                started_at,
                completed_at,
                success,
                detail,
            };
            if let Err(err) = recorder.record_run(record) {
                if outcome.is_ok() {
                    outcome = Err(err);
                } else {
                    warn!("Failed to record run '{}': {}", summary.run_id, err);
                }
            }
        }

        if summary.success {
            info!("Scenario '{}' completed as run '{}'", scenario.id, summary.run_id);
        } else {
            warn!(
                "Scenario '{}' failed in run '{}': {}",
                scenario.id, summary.run_id, summary.detail
            );
        }

        self.last_run = Some(summary.clone());
        outcome.map(|()| summary)
    }
}
