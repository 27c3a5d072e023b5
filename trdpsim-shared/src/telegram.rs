//! Telegram and diagnostic types exchanged with a communication endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One-way cyclic telegram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDataMessage {
    pub label: String,
    pub com_id: u32,
    pub dataset_id: u32,
    pub payload: Vec<u8>,
}

/// Request telegram that expects an acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDataMessage {
    pub label: String,
    pub com_id: u32,
    pub dataset_id: u32,
    pub payload: Vec<u8>,
}

impl fmt::Display for ProcessDataMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (comId={}, dataset={}, bytes={})",
            self.label,
            self.com_id,
            self.dataset_id,
            self.payload.len()
        )
    }
}

impl fmt::Display for MessageDataMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (comId={}, dataset={}, bytes={})",
            self.label,
            self.com_id,
            self.dataset_id,
            self.payload.len()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDataStatus {
    Delivered,
    Timeout,
    Failed,
}

impl fmt::Display for MessageDataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MessageDataStatus::Delivered => "delivered",
            MessageDataStatus::Timeout => "timeout",
            MessageDataStatus::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Outcome of a message data exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDataAck {
    pub status: MessageDataStatus,
    pub detail: String,
}

impl MessageDataAck {
    pub fn delivered(detail: impl Into<String>) -> Self {
        Self {
            status: MessageDataStatus::Delivered,
            detail: detail.into(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.status == MessageDataStatus::Delivered
    }
}

impl fmt::Display for MessageDataAck {
    /// `delivered`, or `timeout - no reply` when a detail is present
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{} - {}", self.status, self.detail)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Info,
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Info => f.write_str("INFO"),
            DiagnosticLevel::Error => f.write_str("ERROR"),
        }
    }
}

/// Entry in an endpoint's diagnostic history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub timestamp: String,
    pub level: DiagnosticLevel,
    pub message: String,
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.timestamp, self.level, self.message)
    }
}
