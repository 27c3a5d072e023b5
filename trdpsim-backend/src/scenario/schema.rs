//! Rule-driven structural validation of scenario documents.
//!
//! A schema document is a list of `key: a, b, c` lines naming the fields a
//! scenario may or must contain:
//!
//! ```text
//! required_scenario_fields: scenario, device
//! allowed_scenario_fields: scenario, device
//! required_event_fields: type, label
//! allowed_event_fields: type, label, com_id, dataset_id, payload, delay_ms
//! enum_event_type: pd, md
//! numeric_event_fields: com_id, dataset_id, delay_ms
//! ```
//!
//! Categories that are absent (or empty) keep the built-in defaults.
//! Validation is purely structural: device references are resolved later by
//! the parser.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use trdpsim_shared::scenario_text::{self, parse_key_value, trim};
use trdpsim_shared::{SimError, SimResult};

const SCENARIO_ID_PATTERN: &str = "^[A-Za-z0-9_-]+$";

/// Field rules applied by [`ScenarioSchemaValidator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRules {
    pub required_scenario_fields: BTreeSet<String>,
    pub allowed_scenario_fields: BTreeSet<String>,
    pub required_event_fields: BTreeSet<String>,
    pub allowed_event_fields: BTreeSet<String>,
    pub event_types: BTreeSet<String>,
    pub numeric_event_fields: BTreeSet<String>,
}

fn set_of(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for SchemaRules {
    fn default() -> Self {
        Self {
            required_scenario_fields: set_of(&["scenario", "device"]),
            allowed_scenario_fields: set_of(&["scenario", "device"]),
            required_event_fields: set_of(&["type", "label"]),
            allowed_event_fields: set_of(&[
                "type",
                "label",
                "com_id",
                "dataset_id",
                "payload",
                "delay_ms",
            ]),
            event_types: set_of(&["pd", "md"]),
            numeric_event_fields: BTreeSet::new(),
        }
    }
}

impl SchemaRules {
    /// Parse a schema document, keeping defaults for absent categories
    pub fn parse(document: &str) -> SimResult<Self> {
        let mut rules = Self::default();

        for raw in document.lines() {
            let line = trim(raw);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = parse_key_value(line)?;
            let values = split_list(value);
            if values.is_empty() {
                continue;
            }
            match key {
                "required_scenario_fields" => rules.required_scenario_fields = values,
                "allowed_scenario_fields" => rules.allowed_scenario_fields = values,
                "required_event_fields" => rules.required_event_fields = values,
                "allowed_event_fields" => rules.allowed_event_fields = values,
                "enum_event_type" => rules.event_types = values,
                "numeric_event_fields" => rules.numeric_event_fields = values,
                other => debug!("Ignoring unknown schema key '{}'", other),
            }
        }

        Ok(rules)
    }
}

fn split_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Checks scenario documents against a [`SchemaRules`] set
#[derive(Debug, Clone)]
pub struct ScenarioSchemaValidator {
    rules: SchemaRules,
    id_pattern: Regex,
}

impl ScenarioSchemaValidator {
    pub fn new(rules: SchemaRules) -> SimResult<Self> {
        let id_pattern = Regex::new(SCENARIO_ID_PATTERN)
            .map_err(|e| SimError::logic(format!("Invalid scenario id pattern: {}", e)))?;
        Ok(Self { rules, id_pattern })
    }

    /// Validator with the built-in rules only
    pub fn with_defaults() -> SimResult<Self> {
        Self::new(SchemaRules::default())
    }

    pub fn from_document(document: &str) -> SimResult<Self> {
        Self::new(SchemaRules::parse(document)?)
    }

    /// Load rules from a schema file
    pub fn load(path: &Path) -> SimResult<Self> {
        if !path.is_file() {
            return Err(SimError::not_found(
                "Scenario schema",
                path.display().to_string(),
            ));
        }
        let document = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        debug!("Loaded scenario schema from {}", path.display());
        Self::from_document(&document)
    }

    pub fn rules(&self) -> &SchemaRules {
        &self.rules
    }

    pub fn validate_file(&self, path: &Path) -> SimResult<()> {
        if !path.is_file() {
            return Err(SimError::validation(format!(
                "Scenario file not found: {}",
                path.display()
            )));
        }
        let document = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        self.validate(&document)
    }

    /// Validate a document, reporting the first problem in document order
    pub fn validate(&self, document: &str) -> SimResult<()> {
        let mut in_events = false;
        let mut event_active = false;
        let mut event_count = 0usize;
        let mut scenario_fields = BTreeSet::new();
        let mut event_fields = BTreeSet::new();

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
                self.check_scenario_field(key, value)?;
                scenario_fields.insert(key.to_string());
                continue;
            }

            if let Some(rest) = line.strip_prefix('-') {
                if event_active {
                    self.ensure_required(&self.rules.required_event_fields, &event_fields, "event")?;
                    event_fields.clear();
                }
                event_active = true;
                event_count += 1;

                let rest = trim(rest);
                if !rest.is_empty() {
                    let (key, value) = parse_key_value(rest)?;
                    self.check_event_field(key, value)?;
                    event_fields.insert(key.to_string());
                }
                continue;
            }

            if !event_active {
                return Err(SimError::validation(format!(
                    "Event field defined outside of list: {}",
                    line
                )));
            }

            let (key, value) = parse_key_value(line)?;
            self.check_event_field(key, value)?;
            event_fields.insert(key.to_string());
        }

        if !in_events {
            return Err(SimError::validation("Scenario must declare an events list"));
        }
        if event_active {
            self.ensure_required(&self.rules.required_event_fields, &event_fields, "event")?;
        }
        if event_count == 0 {
            return Err(SimError::validation("Scenario does not contain any events"));
        }
        self.ensure_required(
            &self.rules.required_scenario_fields,
            &scenario_fields,
            "scenario",
        )
    }

    fn check_scenario_field(&self, key: &str, value: &str) -> SimResult<()> {
        if key != "events" && !self.rules.allowed_scenario_fields.contains(key) {
            return Err(SimError::validation(format!(
                "Unknown scenario field: {}",
                key
            )));
        }
        match key {
            "scenario" => {
                if value.is_empty() {
                    return Err(SimError::validation("Scenario id cannot be empty"));
                }
                if !self.id_pattern.is_match(value) {
                    return Err(SimError::validation(format!(
                        "Scenario id contains invalid characters: {}",
                        value
                    )));
                }
            }
            "device" if value.is_empty() => {
                return Err(SimError::validation("Scenario device cannot be empty"));
            }
            _ => {}
        }
        Ok(())
    }

    fn check_event_field(&self, key: &str, value: &str) -> SimResult<()> {
        if !self.rules.allowed_event_fields.contains(key) {
            return Err(SimError::validation(format!("Unknown event field: {}", key)));
        }

        if key == "type" {
            if !self.rules.event_types.contains(value) {
                return Err(SimError::validation(format!(
                    "Event type '{}' not permitted",
                    value
                )));
            }
            scenario_text::parse_event_kind(value)?;
            return Ok(());
        }

        if self.rules.numeric_event_fields.contains(key) {
            if value.is_empty() {
                return Err(SimError::validation(format!(
                    "Numeric event field '{}' cannot be empty",
                    key
                )));
            }
            if !value.chars().all(|c| c.is_ascii_digit()) {
                return Err(SimError::validation(format!(
                    "Numeric event field '{}' contains non-digit characters",
                    key
                )));
            }
            return Ok(());
        }

        if key == "payload" {
            scenario_text::parse_payload(value)?;
        }
        Ok(())
    }

    fn ensure_required(
        &self,
        required: &BTreeSet<String>,
        present: &BTreeSet<String>,
        context: &str,
    ) -> SimResult<()> {
        match required.iter().find(|field| !present.contains(*field)) {
            Some(missing) => Err(SimError::validation(format!(
                "Missing required {} field: {}",
                context, missing
            ))),
            None => Ok(()),
        }
    }
}
