use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::telegram::MessageDataStatus;

/// Failure reported by a communication stack.
///
/// `code` is the stack's numeric error code and `context` names the endpoint
/// or operation the stack was working on, when it knows one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct ConnectionError {
    pub code: i32,
    pub message: String,
    pub context: Option<String>,
}

impl ConnectionError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = if context.is_empty() {
            None
        } else {
            Some(context)
        };
        self
    }

    /// Diagnostic line for a failed operation, e.g.
    /// `md failure (code 1003) context=send: called without open session`.
    pub fn describe(&self, operation: &str) -> String {
        match &self.context {
            Some(context) => format!(
                "{} failure (code {}) context={}: {}",
                operation, self.code, context, self.message
            ),
            None => format!(
                "{} failure (code {}): {}",
                operation, self.code, self.message
            ),
        }
    }
}

/// Error type shared by the repositories, the parser and the engine
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Invalid state: {message}")]
    Logic { message: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Message data '{label}' was not delivered ({status}): {detail}")]
    AcknowledgmentRejected {
        label: String,
        status: MessageDataStatus,
        detail: String,
    },

    #[error("Profile validator unavailable: {message}")]
    ValidatorUnavailable { message: String },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SimError {
    pub fn validation(message: impl Into<String>) -> Self {
        SimError::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        SimError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn logic(message: impl Into<String>) -> Self {
        SimError::Logic {
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        SimError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Attach a path to an I/O error
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        SimError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Summary stored in a failed run record.
    ///
    /// A rejected acknowledgment reports the stack's own detail text. A
    /// failure without any message reads `unknown failure`.
    pub fn run_detail(&self) -> String {
        let detail = match self {
            SimError::AcknowledgmentRejected { detail, .. } => detail.clone(),
            other => other.to_string(),
        };
        if detail.trim().is_empty() {
            "unknown failure".to_string()
        } else {
            detail
        }
    }

    /// Process exit code used by the command line front end
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::Io { .. } | SimError::InvalidArgument { .. } => 1,
            SimError::Connection(_) => 2,
            SimError::Validation { .. } | SimError::ValidatorUnavailable { .. } => 3,
            SimError::NotFound { .. } => 4,
            SimError::AcknowledgmentRejected { .. } => 5,
            SimError::Logic { .. } => 6,
        }
    }
}

/// Result type alias for convenience
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_describe_with_context() {
        let error = ConnectionError::new(1003, "called without open session").with_context("md");
        assert_eq!(
            error.describe("md"),
            "md failure (code 1003) context=md: called without open session"
        );
    }

    #[test]
    fn test_connection_error_empty_context_is_omitted() {
        let error = ConnectionError::new(1002, "Session already closed").with_context("");
        assert_eq!(
            error.describe("close"),
            "close failure (code 1002): Session already closed"
        );
    }

    #[test]
    fn test_run_detail_uses_ack_detail() {
        let error = SimError::AcknowledgmentRejected {
            label: "door".to_string(),
            status: MessageDataStatus::Timeout,
            detail: "no reply within 500ms".to_string(),
        };
        assert_eq!(error.run_detail(), "no reply within 500ms");
        assert_eq!(error.exit_code(), 5);
    }

    #[test]
    fn test_run_detail_without_message_is_unknown_failure() {
        let error = SimError::AcknowledgmentRejected {
            label: "door".to_string(),
            status: MessageDataStatus::Failed,
            detail: String::new(),
        };
        assert_eq!(error.run_detail(), "unknown failure");

        let blank = SimError::AcknowledgmentRejected {
            label: "door".to_string(),
            status: MessageDataStatus::Timeout,
            detail: "  ".to_string(),
        };
        assert_eq!(blank.run_detail(), "unknown failure");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SimError::validation("bad").exit_code(), 3);
        assert_eq!(SimError::not_found("Scenario", "x").exit_code(), 4);
        assert_eq!(
            SimError::from(ConnectionError::new(1001, "already open")).exit_code(),
            2
        );
        assert_eq!(SimError::logic("No scenario loaded").exit_code(), 6);
    }

    #[test]
    fn test_not_found_message() {
        let error = SimError::not_found("Device profile", "brake-unit");
        assert_eq!(error.to_string(), "Device profile not found: brake-unit");
    }
}
