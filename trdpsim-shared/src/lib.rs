//! Shared types for the TRDP scenario simulator.
//!
//! This crate holds the data model used by the backend repositories and the
//! simulation engine, together with the plain-text helpers that read and
//! write scenario documents.
//!
//! # Key Components
//!
//! * [`scenario`] - Scenario, event and manifest record types
//! * [`telegram`] - Process/message data telegrams, acknowledgments and diagnostics
//! * [`scenario_text`] - `key: value` line parsing, payload decoding and rendering
//! * [`errors`] - The [`SimError`] type shared by every layer
//!
//! # Data Flow
//!
//! ```text
//! device profile ──► scenario document ──► Scenario ──► engine ──► endpoint
//!                                                           │
//!                                                           └──► RunRecord
//! ```

pub mod errors;
pub mod scenario;
pub mod scenario_text;
pub mod telegram;

pub use errors::{ConnectionError, SimError, SimResult};
pub use scenario::{
    DeviceProfileRecord, EventKind, RunRecord, Scenario, ScenarioEvent, ScenarioRecord,
};
pub use telegram::{
    DiagnosticEvent, DiagnosticLevel, MessageDataAck, MessageDataMessage, MessageDataStatus,
    ProcessDataMessage,
};
