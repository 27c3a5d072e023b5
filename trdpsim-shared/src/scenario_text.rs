//! Line-level helpers for the scenario document format.
//!
//! Scenario documents are a small indentation-tolerant `key: value` format:
//!
//! ```text
//! scenario: door-cycle
//! device: brake-unit
//! events:
//!   - type: pd
//!     label: "speed"
//!     com_id: 1000
//!     payload: 0x0102
//!     delay_ms: 50
//! ```
//!
//! The schema validator and the parser both build on these helpers so that a
//! document accepted by one is read identically by the other.

use std::fmt::Write as _;
use std::time::Duration;

use hex::FromHexError;

use crate::errors::{SimError, SimResult};
use crate::scenario::{EventKind, Scenario, ScenarioEvent};

/// Trim spaces, tabs and line terminators from both ends
pub fn trim(value: &str) -> &str {
    value.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

/// Split a `key: value` line at the first colon.
///
/// Both halves are trimmed and a value wrapped in double quotes is unwrapped.
pub fn parse_key_value(line: &str) -> SimResult<(&str, &str)> {
    let (key, value) = line
        .split_once(':')
        .ok_or_else(|| SimError::validation(format!("Invalid line (missing ':'): {}", line)))?;

    let key = trim(key);
    let mut value = trim(value);
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value = &value[1..value.len() - 1];
    }
    Ok((key, value))
}

pub fn parse_event_kind(token: &str) -> SimResult<EventKind> {
    match token {
        "pd" => Ok(EventKind::ProcessData),
        "md" => Ok(EventKind::MessageData),
        other => Err(SimError::validation(format!(
            "Unknown event type: {}",
            other
        ))),
    }
}

/// True when the value uses the `0x`-prefixed hex payload form
pub fn is_hex_payload(value: &str) -> bool {
    value.len() > 2 && (value.starts_with("0x") || value.starts_with("0X"))
}

/// Decode an event payload.
///
/// `0x`/`0X` values are decoded as hex pairs; anything else is taken as the
/// raw bytes of the text. An empty value is an empty payload.
pub fn parse_payload(value: &str) -> SimResult<Vec<u8>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    if !is_hex_payload(value) {
        return Ok(value.as_bytes().to_vec());
    }

    hex::decode(&value[2..]).map_err(|err| match err {
        FromHexError::InvalidHexCharacter { c, .. } => SimError::validation(format!(
            "Hex payload contains invalid character '{}'",
            c
        )),
        _ => SimError::validation("Hex payload must contain an even number of characters"),
    })
}

/// Parse a millisecond delay; empty means no delay
pub fn parse_delay(value: &str) -> SimResult<Duration> {
    if value.is_empty() {
        return Ok(Duration::ZERO);
    }
    if let Some(stripped) = value.strip_prefix('-') {
        if stripped.parse::<u64>().is_ok() {
            return Err(SimError::validation(format!(
                "Delay must not be negative: {}",
                value
            )));
        }
    }
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| SimError::validation(format!("Invalid delay_ms '{}': {}", value, e)))
}

/// Parse a 32-bit numeric field such as `com_id`
pub fn parse_u32(field: &str, value: &str) -> SimResult<u32> {
    value
        .parse::<u32>()
        .map_err(|e| SimError::validation(format!("Invalid {} '{}': {}", field, value, e)))
}

/// One-line summary used in event logs, e.g.
/// `pd::speed::comId=1000::dataset=0::bytes=2::delayMs=50`
pub fn describe_event(event: &ScenarioEvent) -> String {
    format!(
        "{}::{}::comId={}::dataset={}::bytes={}::delayMs={}",
        event.kind.as_token(),
        event.label,
        event.com_id,
        event.dataset_id,
        event.payload.len(),
        event.delay.as_millis()
    )
}

/// Render a scenario back into document form.
///
/// Payloads are always written in hex so that the output parses back to the
/// same bytes.
pub fn render_scenario(scenario: &Scenario) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "scenario: {}", scenario.id);
    let _ = writeln!(out, "device: {}", scenario.device_profile_id);
    out.push_str("events:\n");
    for event in &scenario.events {
        let _ = writeln!(out, "  - type: {}", event.kind.as_token());
        let _ = writeln!(out, "    label: \"{}\"", event.label);
        let _ = writeln!(out, "    com_id: {}", event.com_id);
        let _ = writeln!(out, "    dataset_id: {}", event.dataset_id);
        if !event.payload.is_empty() {
            let _ = writeln!(out, "    payload: 0x{}", hex::encode_upper(&event.payload));
        }
        let _ = writeln!(out, "    delay_ms: {}", event.delay.as_millis());
    }
    out
}
