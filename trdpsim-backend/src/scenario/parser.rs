//! Scenario document parser.
//!
//! Turns a validated scenario document into a typed [`Scenario`], resolving
//! the device reference through a [`ProfileLookup`].

use std::fs;
use std::path::Path;

use tracing::debug;

use trdpsim_shared::scenario_text::{
    parse_delay, parse_event_kind, parse_key_value, parse_payload, parse_u32, trim,
};
use trdpsim_shared::{Scenario, ScenarioEvent, SimError, SimResult};

use crate::device::ProfileLookup;

/// Event under construction; `kind` and `label` must be set explicitly
#[derive(Default)]
struct EventDraft {
    kind: Option<trdpsim_shared::EventKind>,
    label: Option<String>,
    com_id: u32,
    dataset_id: u32,
    payload: Vec<u8>,
    delay: std::time::Duration,
}

impl EventDraft {
    fn apply(&mut self, key: &str, value: &str) -> SimResult<()> {
        match key {
            "type" => self.kind = Some(parse_event_kind(value)?),
            "label" => self.label = Some(value.to_string()),
            "com_id" => self.com_id = parse_u32(key, value)?,
            "dataset_id" => self.dataset_id = parse_u32(key, value)?,
            "payload" => self.payload = parse_payload(value)?,
            "delay_ms" => self.delay = parse_delay(value)?,
            other => {
                return Err(SimError::validation(format!(
                    "Unknown event field: {}",
                    other
                )));
            }
        }
        Ok(())
    }

    fn finish(self) -> SimResult<ScenarioEvent> {
        let kind = self
            .kind
            .ok_or_else(|| SimError::validation("Scenario event is missing a type"))?;
        let label = self
            .label
            .ok_or_else(|| SimError::validation("Scenario event is missing a label"))?;
        Ok(ScenarioEvent {
            kind,
            label,
            com_id: self.com_id,
            dataset_id: self.dataset_id,
            payload: self.payload,
            delay: self.delay,
        })
    }
}

/// Parse a document that declares its own `scenario:` id
pub fn parse(document: &str, lookup: &impl ProfileLookup) -> SimResult<Scenario> {
    parse_with_default_id(document, None, lookup)
}

/// Parse a scenario file; the file stem is the id unless the document names one
pub fn parse_file(path: &Path, lookup: &impl ProfileLookup) -> SimResult<Scenario> {
    if !path.is_file() {
        return Err(SimError::validation(format!(
            "Scenario file not found: {}",
            path.display()
        )));
    }
    let document = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());
    parse_with_default_id(&document, stem.as_deref(), lookup)
}

fn parse_with_default_id(
    document: &str,
    default_id: Option<&str>,
    lookup: &impl ProfileLookup,
) -> SimResult<Scenario> {
    let mut id = default_id.map(str::to_string);
    let mut device: Option<String> = None;
    let mut events = Vec::new();
    let mut in_events = false;
    let mut current: Option<EventDraft> = None;

    for raw in document.lines() {
        let line = trim(raw);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line == "events:" {
            in_events = true;
            continue;
        }

        if !in_events {
            let (key, value) = parse_key_value(line)?;
            match key {
                "scenario" => {
                    if value.is_empty() {
                        return Err(SimError::validation("Scenario id cannot be empty"));
                    }
                    id = Some(value.to_string());
                }
                "device" => {
                    if value.is_empty() {
                        return Err(SimError::validation("Scenario device cannot be empty"));
                    }
                    device = Some(value.to_string());
                }
                other => {
                    return Err(SimError::validation(format!(
                        "Unknown scenario field: {}",
                        other
                    )));
                }
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix('-') {
            if let Some(done) = current.take() {
                events.push(done.finish()?);
            }
            let mut draft = EventDraft::default();
            let rest = trim(rest);
            if !rest.is_empty() {
                let (key, value) = parse_key_value(rest)?;
                draft.apply(key, value)?;
            }
            current = Some(draft);
            continue;
        }

        let draft = current.as_mut().ok_or_else(|| {
            SimError::validation(format!("Event field defined outside of list: {}", line))
        })?;
        let (key, value) = parse_key_value(line)?;
        draft.apply(key, value)?;
    }

    if let Some(done) = current.take() {
        events.push(done.finish()?);
    }

    let device = device
        .ok_or_else(|| SimError::validation("Scenario does not reference a device profile"))?;
    if !lookup.profile_exists(&device) {
        return Err(SimError::validation(format!(
            "Scenario references unknown device profile: {}",
            device
        )));
    }
    if events.is_empty() {
        return Err(SimError::validation("Scenario does not contain any events"));
    }
    let id = id.ok_or_else(|| SimError::validation("Scenario does not declare an id"))?;

    debug!(
        "Parsed scenario '{}' with {} events for device '{}'",
        id,
        events.len(),
        device
    );

    Ok(Scenario {
        id,
        device_profile_id: device,
        events,
    })
}
