//! In-process loopback stack.
//!
//! Each dispatched telegram is queued and handed back on the next poll, as
//! if a peer had echoed it. Fault injection hooks let tests reproduce
//! rejected acknowledgments and transport failures.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use trdpsim_shared::{ConnectionError, MessageDataAck, MessageDataMessage, ProcessDataMessage};

use super::stack::{Inbound, StackAdapter};
use super::{ERR_ALREADY_CLOSED, ERR_ALREADY_OPEN, ERR_NOT_OPEN, ERR_TRANSPORT};

const LOOPBACK_DETAIL: &str = "loopback";

#[derive(Debug)]
pub struct LoopbackStack {
    open: bool,
    endpoint: String,
    echo: bool,
    pending: VecDeque<Inbound>,
    ack_overrides: HashMap<String, MessageDataAck>,
    failing_labels: HashSet<String>,
    fail_open: bool,
    fail_close: bool,
    close_calls: usize,
}

impl Default for LoopbackStack {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackStack {
    pub fn new() -> Self {
        Self {
            open: false,
            endpoint: String::new(),
            echo: true,
            pending: VecDeque::new(),
            ack_overrides: HashMap::new(),
            failing_labels: HashSet::new(),
            fail_open: false,
            fail_close: false,
            close_calls: 0,
        }
    }

    /// Answer message data for `label` with `ack` instead of delivering it
    pub fn with_ack(mut self, label: impl Into<String>, ack: MessageDataAck) -> Self {
        self.ack_overrides.insert(label.into(), ack);
        self
    }

    /// Fail any telegram for `label` with a transport error
    pub fn with_failing_label(mut self, label: impl Into<String>) -> Self {
        self.failing_labels.insert(label.into());
        self
    }

    /// Refuse `open_session`
    pub fn with_failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Refuse `close_session` while still counting the call
    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Disable echoing; polls then return nothing
    pub fn silent(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn ensure_open(&self, operation: &str) -> Result<(), ConnectionError> {
        if self.open {
            Ok(())
        } else {
            Err(ConnectionError::new(
                ERR_NOT_OPEN,
                format!("{} called without open session", operation),
            )
            .with_context(operation))
        }
    }

    fn ensure_deliverable(&self, label: &str) -> Result<(), ConnectionError> {
        if self.failing_labels.contains(label) {
            Err(
                ConnectionError::new(ERR_TRANSPORT, format!("transport fault on '{}'", label))
                    .with_context(self.endpoint.clone()),
            )
        } else {
            Ok(())
        }
    }
}

impl StackAdapter for LoopbackStack {
    fn open_session(&mut self, endpoint: &str) -> Result<(), ConnectionError> {
        if self.open {
            return Err(
                ConnectionError::new(ERR_ALREADY_OPEN, "Session already open")
                    .with_context(endpoint),
            );
        }
        if self.fail_open {
            return Err(
                ConnectionError::new(ERR_TRANSPORT, "Endpoint unreachable").with_context(endpoint),
            );
        }
        self.open = true;
        self.endpoint = endpoint.to_string();
        debug!("Loopback session opened on {}", endpoint);
        Ok(())
    }

    fn close_session(&mut self) -> Result<(), ConnectionError> {
        self.close_calls += 1;
        if !self.open {
            return Err(
                ConnectionError::new(ERR_ALREADY_CLOSED, "Session already closed")
                    .with_context(self.endpoint.clone()),
            );
        }
        if self.fail_close {
            return Err(
                ConnectionError::new(ERR_TRANSPORT, "Session close refused")
                    .with_context(self.endpoint.clone()),
            );
        }
        self.open = false;
        self.pending.clear();
        Ok(())
    }

    fn publish_process_data(
        &mut self,
        message: &ProcessDataMessage,
    ) -> Result<(), ConnectionError> {
        self.ensure_open("publishProcessData")?;
        self.ensure_deliverable(&message.label)?;
        if self.echo {
            self.pending.push_back(Inbound::ProcessData(message.clone()));
        }
        Ok(())
    }

    fn send_message_data(
        &mut self,
        message: &MessageDataMessage,
    ) -> Result<MessageDataAck, ConnectionError> {
        self.ensure_open("sendMessageData")?;
        self.ensure_deliverable(&message.label)?;
        if let Some(ack) = self.ack_overrides.get(&message.label) {
            return Ok(ack.clone());
        }
        if self.echo {
            self.pending.push_back(Inbound::MessageData(message.clone()));
        }
        Ok(MessageDataAck::delivered(LOOPBACK_DETAIL))
    }

    fn poll(&mut self) -> Result<Vec<Inbound>, ConnectionError> {
        self.ensure_open("poll")?;
        Ok(self.pending.drain(..).collect())
    }
}
