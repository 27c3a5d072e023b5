//! Session wrapper that records what happened on the wire.

use tracing::{debug, warn};

use trdpsim_shared::{
    ConnectionError, DiagnosticEvent, DiagnosticLevel, MessageDataAck, MessageDataMessage,
    ProcessDataMessage, SimResult,
};

use super::stack::{Inbound, StackAdapter};
use super::{CommunicationEndpoint, ERR_ALREADY_OPEN, ERR_NOT_OPEN};
use crate::utils::time;

type ProcessDataHandler = Box<dyn FnMut(&ProcessDataMessage)>;
type MessageDataHandler = Box<dyn FnMut(&MessageDataMessage)>;

/// A [`CommunicationEndpoint`] on top of a [`StackAdapter`].
///
/// Successful operations are recorded as info diagnostics, stack failures as
/// error diagnostics, and both are mirrored into the telemetry lines.
pub struct TrdpSession<A: StackAdapter> {
    endpoint: String,
    adapter: A,
    open: bool,
    telemetry: Vec<String>,
    diagnostics: Vec<DiagnosticEvent>,
    pd_handler: Option<ProcessDataHandler>,
    md_handler: Option<MessageDataHandler>,
}

impl<A: StackAdapter> TrdpSession<A> {
    pub fn new(endpoint: impl Into<String>, adapter: A) -> Self {
        Self {
            endpoint: endpoint.into(),
            adapter,
            open: false,
            telemetry: Vec::new(),
            diagnostics: Vec::new(),
            pd_handler: None,
            md_handler: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Called for every inbound process data telegram during `poll`
    pub fn on_process_data(&mut self, handler: impl FnMut(&ProcessDataMessage) + 'static) {
        self.pd_handler = Some(Box::new(handler));
    }

    /// Called for every inbound message data telegram during `poll`
    pub fn on_message_data(&mut self, handler: impl FnMut(&MessageDataMessage) + 'static) {
        self.md_handler = Some(Box::new(handler));
    }

    fn record(&mut self, level: DiagnosticLevel, message: String) {
        let timestamp = time::telemetry_timestamp();
        let line = match level {
            DiagnosticLevel::Info => format!("{} | {}", timestamp, message),
            DiagnosticLevel::Error => format!("{} | error -> {}", timestamp, message),
        };
        self.telemetry.push(line);
        self.diagnostics.push(DiagnosticEvent {
            timestamp,
            level,
            message,
        });
    }

    /// Record a stack failure and hand it back for propagation
    fn stack_failure(&mut self, operation: &str, error: ConnectionError) -> ConnectionError {
        let line = error.describe(operation);
        warn!("{}", line);
        self.record(DiagnosticLevel::Error, line);
        error
    }

    fn require_open(&self, what: &str) -> SimResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(ConnectionError::new(
                ERR_NOT_OPEN,
                format!("Cannot {}: connection closed", what),
            )
            .into())
        }
    }
}

impl<A: StackAdapter> CommunicationEndpoint for TrdpSession<A> {
    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> SimResult<()> {
        if self.open {
            return Err(ConnectionError::new(ERR_ALREADY_OPEN, "TRDP connection already open")
                .with_context(self.endpoint.clone())
                .into());
        }
        if let Err(err) = self.adapter.open_session(&self.endpoint) {
            return Err(self.stack_failure("open", err).into());
        }
        self.open = true;
        debug!("Session open on {}", self.endpoint);
        self.record(DiagnosticLevel::Info, format!("open -> {}", self.endpoint));
        Ok(())
    }

    fn close(&mut self) -> SimResult<()> {
        if !self.open {
            return Err(ConnectionError::new(ERR_NOT_OPEN, "TRDP connection not open")
                .with_context(self.endpoint.clone())
                .into());
        }
        if let Err(err) = self.adapter.close_session() {
            return Err(self.stack_failure("close", err).into());
        }
        self.open = false;
        debug!("Session on {} closed", self.endpoint);
        self.record(DiagnosticLevel::Info, "close".to_string());
        Ok(())
    }

    fn publish_process_data(&mut self, message: &ProcessDataMessage) -> SimResult<()> {
        self.require_open("publish PD telegram")?;
        if let Err(err) = self.adapter.publish_process_data(message) {
            return Err(self.stack_failure("pd", err).into());
        }
        self.record(DiagnosticLevel::Info, format!("pd -> {}", message));
        Ok(())
    }

    fn send_message_data(&mut self, message: &MessageDataMessage) -> SimResult<MessageDataAck> {
        self.require_open("send MD telegram")?;
        let ack = match self.adapter.send_message_data(message) {
            Ok(ack) => ack,
            Err(err) => return Err(self.stack_failure("md", err).into()),
        };
        self.record(DiagnosticLevel::Info, format!("md -> {} | {}", message, ack));
        Ok(ack)
    }

    fn poll(&mut self) -> SimResult<()> {
        let inbound = match self.adapter.poll() {
            Ok(inbound) => inbound,
            Err(err) => return Err(self.stack_failure("poll", err).into()),
        };

        for telegram in inbound {
            match telegram {
                Inbound::ProcessData(message) => {
                    self.record(DiagnosticLevel::Info, format!("pd <- {}", message));
                    if let Some(handler) = self.pd_handler.as_mut() {
                        handler(&message);
                    }
                }
                Inbound::MessageData(message) => {
                    self.record(DiagnosticLevel::Info, format!("md <- {}", message));
                    if let Some(handler) = self.md_handler.as_mut() {
                        handler(&message);
                    }
                }
            }
        }
        Ok(())
    }

    fn telemetry(&self) -> &[String] {
        &self.telemetry
    }

    fn diagnostics(&self) -> &[DiagnosticEvent] {
        &self.diagnostics
    }
}
