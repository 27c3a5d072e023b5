//! Transport-level adapter trait.

use trdpsim_shared::{ConnectionError, MessageDataAck, MessageDataMessage, ProcessDataMessage};

/// Telegram received from the stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    ProcessData(ProcessDataMessage),
    MessageData(MessageDataMessage),
}

/// Wire-level operations behind a session.
///
/// Every failure carries the stack's numeric error code.
pub trait StackAdapter {
    fn open_session(&mut self, endpoint: &str) -> Result<(), ConnectionError>;
    fn close_session(&mut self) -> Result<(), ConnectionError>;
    fn publish_process_data(&mut self, message: &ProcessDataMessage)
    -> Result<(), ConnectionError>;
    fn send_message_data(
        &mut self,
        message: &MessageDataMessage,
    ) -> Result<MessageDataAck, ConnectionError>;
    /// Telegrams that arrived since the previous poll, oldest first
    fn poll(&mut self) -> Result<Vec<Inbound>, ConnectionError>;
}
