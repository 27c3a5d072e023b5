//! Scenario data model and manifest records.
//!
//! A [`Scenario`] is an ordered list of [`ScenarioEvent`]s bound to one
//! registered device profile. The record types mirror one line of the
//! repositories' manifest files and are what the command line prints.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::telegram::{MessageDataMessage, ProcessDataMessage};

/// Kind of telegram an event produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// One-way publish (`pd`)
    ProcessData,
    /// Acknowledged request (`md`)
    MessageData,
}

impl EventKind {
    /// Token used in scenario documents
    pub fn as_token(&self) -> &'static str {
        match self {
            EventKind::ProcessData => "pd",
            EventKind::MessageData => "md",
        }
    }
}

/// Single step of a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioEvent {
    pub kind: EventKind,
    pub label: String,
    pub com_id: u32,
    pub dataset_id: u32,
    pub payload: Vec<u8>,
    /// Wait applied before the event is dispatched
    pub delay: Duration,
}

impl ScenarioEvent {
    pub fn new(kind: EventKind, label: impl Into<String>, com_id: u32) -> Self {
        Self {
            kind,
            label: label.into(),
            com_id,
            dataset_id: 0,
            payload: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_dataset(mut self, dataset_id: u32) -> Self {
        self.dataset_id = dataset_id;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn to_process_data(&self) -> ProcessDataMessage {
        ProcessDataMessage {
            label: self.label.clone(),
            com_id: self.com_id,
            dataset_id: self.dataset_id,
            payload: self.payload.clone(),
        }
    }

    pub fn to_message_data(&self) -> MessageDataMessage {
        MessageDataMessage {
            label: self.label.clone(),
            com_id: self.com_id,
            dataset_id: self.dataset_id,
            payload: self.payload.clone(),
        }
    }
}

/// Executable scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub device_profile_id: String,
    pub events: Vec<ScenarioEvent>,
}

impl Scenario {
    /// Sum of all inter-event delays
    pub fn total_delay(&self) -> Duration {
        self.events.iter().map(|event| event.delay).sum()
    }
}

/// A registered, schema-validated device profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfileRecord {
    pub id: String,
    pub stored_path: PathBuf,
    pub source_path: PathBuf,
    pub checksum: String,
    pub validated_at: String,
}

/// An imported scenario document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub id: String,
    pub device_profile_id: String,
    pub stored_path: PathBuf,
    pub checksum: String,
    pub created_at: String,
    pub updated_at: String,
}

/// History entry for one engine run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub scenario_id: String,
    pub artefact_path: PathBuf,
    pub started_at: String,
    pub completed_at: String,
    pub success: bool,
    pub detail: String,
}
