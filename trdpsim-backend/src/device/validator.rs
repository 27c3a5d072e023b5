//! XML schema validation of device profiles.
//!
//! The repository only depends on [`ProfileValidator`]. The provided
//! implementation shells out to `xmllint`, which ships with libxml2.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use trdpsim_shared::{SimError, SimResult};

/// Outcome of validating one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileValidation {
    pub success: bool,
    pub message: String,
}

impl ProfileValidation {
    pub fn valid() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Validates a stored device profile.
///
/// An invalid document is `Ok` with `success == false`; `Err` is reserved for
/// the validator itself being unusable.
pub trait ProfileValidator {
    fn validate(&self, document: &Path) -> SimResult<ProfileValidation>;
}

/// Validator backed by `xmllint --noout --schema <xsd> <file>`
#[derive(Debug, Clone)]
pub struct XmllintValidator {
    schema: PathBuf,
    program: String,
}

impl XmllintValidator {
    pub fn new(schema: impl Into<PathBuf>) -> Self {
        Self {
            schema: schema.into(),
            program: "xmllint".to_string(),
        }
    }

    /// Use a different executable, e.g. an absolute path to xmllint
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn schema(&self) -> &Path {
        &self.schema
    }
}

impl ProfileValidator for XmllintValidator {
    fn validate(&self, document: &Path) -> SimResult<ProfileValidation> {
        if !self.schema.exists() {
            return Err(SimError::ValidatorUnavailable {
                message: format!("Schema file not found: {}", self.schema.display()),
            });
        }
        if !document.exists() {
            return Ok(ProfileValidation::invalid(format!(
                "XML file not found: {}",
                document.display()
            )));
        }

        debug!(
            "Validating {} against {}",
            document.display(),
            self.schema.display()
        );

        let output = Command::new(&self.program)
            .arg("--noout")
            .arg("--schema")
            .arg(&self.schema)
            .arg(document)
            .output()
            .map_err(|e| SimError::ValidatorUnavailable {
                message: format!("Failed to execute {}: {}", self.program, e),
            })?;

        if output.status.success() {
            return Ok(ProfileValidation::valid());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            Ok(ProfileValidation::invalid("XML validation failed"))
        } else {
            Ok(ProfileValidation::invalid(stderr))
        }
    }
}
