//! Scenario definition and execution.
//!
//! This module provides the scenario subsystem: schema validation and
//! parsing of scenario documents, scenarios built from command line event
//! specs, the scenario repository with its run history, and the engine that replays scenarios through a communication
//! endpoint.

pub mod artefacts;
pub mod execution;
pub mod inline;
pub mod parser;
pub mod repository;
pub mod schema;

pub use artefacts::{RunArtefacts, RunMetadata};
pub use execution::{EngineState, RunRecorder, RunSummary, SimulationEngine};
pub use repository::ScenarioRepository;
pub use schema::{SchemaRules, ScenarioSchemaValidator};
