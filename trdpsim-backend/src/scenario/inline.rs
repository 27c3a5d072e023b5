//! Scenarios assembled on the command line.
//!
//! An event spec reads `<pd|md>:label[:comId][:dataset][:payload]`. Empty
//! numeric fields are zero, and the payload takes the same `0x` hex or raw
//! text forms as a scenario document. Everything after the fourth colon is
//! payload.

use tracing::debug;

use trdpsim_shared::scenario_text::{parse_event_kind, parse_payload};
use trdpsim_shared::{EventKind, Scenario, ScenarioEvent, SimError, SimResult};

use crate::device::ProfileLookup;

const EVENT_SPEC_FORMAT: &str =
    "Event specification must be <pd|md>:label[:comId][:dataset][:payload]";

/// Parse one `--event` value
pub fn parse_event_spec(spec: &str) -> SimResult<ScenarioEvent> {
    let fields: Vec<&str> = spec.splitn(5, ':').collect();
    if fields.len() < 2 {
        return Err(SimError::invalid_argument(format!(
            "{}: '{}'",
            EVENT_SPEC_FORMAT, spec
        )));
    }

    let kind = parse_event_kind(fields[0]).map_err(|_| {
        SimError::invalid_argument(format!("Unknown event type '{}' in '{}'", fields[0], spec))
    })?;
    let label = fields[1];
    if label.is_empty() {
        return Err(SimError::invalid_argument(format!(
            "Event label cannot be empty: '{}'",
            spec
        )));
    }

    let mut event = ScenarioEvent::new(kind, label, numeric_field(&fields, 2, "comId")?)
        .with_dataset(numeric_field(&fields, 3, "dataset")?);
    if let Some(payload) = fields.get(4).filter(|value| !value.is_empty()) {
        event = event.with_payload(parse_payload(payload)?);
    }
    Ok(event)
}

fn numeric_field(fields: &[&str], index: usize, name: &str) -> SimResult<u32> {
    match fields.get(index) {
        Some(value) if !value.is_empty() => value.parse::<u32>().map_err(|e| {
            SimError::invalid_argument(format!("Invalid {} '{}': {}", name, value, e))
        }),
        _ => Ok(0),
    }
}

/// Door and brake sequence run when no events are given
pub fn demo_events() -> Vec<ScenarioEvent> {
    vec![
        ScenarioEvent::new(EventKind::ProcessData, "door-control", 1001)
            .with_dataset(1001)
            .with_payload(vec![0x01, 0x02]),
        ScenarioEvent::new(EventKind::MessageData, "brake-release", 2001)
            .with_dataset(2001)
            .with_payload(vec![0x7B]),
        ScenarioEvent::new(EventKind::ProcessData, "doors-closed", 1002)
            .with_dataset(1002)
            .with_payload(vec![0x05]),
    ]
}

/// Build a scenario from event specs for a registered device.
///
/// Without specs the scenario carries [`demo_events`].
pub fn build_scenario(
    id: &str,
    device: Option<&str>,
    specs: &[String],
    lookup: &impl ProfileLookup,
) -> SimResult<Scenario> {
    let device = device
        .map(str::trim)
        .filter(|device| !device.is_empty())
        .ok_or_else(|| SimError::invalid_argument("Inline events require --device <profile-id>"))?;
    if !lookup.profile_exists(device) {
        return Err(SimError::validation(format!(
            "Scenario references unknown device profile: {}",
            device
        )));
    }
    let id = id.trim();
    if id.is_empty() {
        return Err(SimError::invalid_argument("Scenario id cannot be empty"));
    }

    let events = if specs.is_empty() {
        demo_events()
    } else {
        specs
            .iter()
            .map(|spec| parse_event_spec(spec))
            .collect::<SimResult<Vec<_>>>()?
    };
    debug!(
        "Built inline scenario '{}' with {} events for device '{}'",
        id,
        events.len(),
        device
    );

    Ok(Scenario {
        id: id.to_string(),
        device_profile_id: device.to_string(),
        events,
    })
}
