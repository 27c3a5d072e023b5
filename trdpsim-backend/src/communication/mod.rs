//! Communication endpoint abstraction.
//!
//! The simulation engine talks to a [`CommunicationEndpoint`]. The provided
//! endpoint is [`TrdpSession`], which records telemetry and diagnostics and
//! delegates the wire work to a [`StackAdapter`]. [`LoopbackStack`] is an
//! in-process adapter that echoes every telegram back to the session.
//!
//! # Telemetry
//!
//! A pd/md/pd scenario replayed through a loopback session yields:
//!
//! ```text
//! <ts> | open -> 127.0.0.1
//! <ts> | pd -> speed (comId=1000, dataset=0, bytes=2)
//! <ts> | pd <- speed (comId=1000, dataset=0, bytes=2)
//! <ts> | md -> door (comId=2000, dataset=0, bytes=1) | delivered - loopback
//! <ts> | md <- door (comId=2000, dataset=0, bytes=1)
//! <ts> | pd -> speed (comId=1000, dataset=0, bytes=2)
//! <ts> | pd <- speed (comId=1000, dataset=0, bytes=2)
//! <ts> | close
//! ```

pub mod loopback;
pub mod session;
pub mod stack;

pub use loopback::LoopbackStack;
pub use session::TrdpSession;
pub use stack::{Inbound, StackAdapter};

use trdpsim_shared::{
    DiagnosticEvent, MessageDataAck, MessageDataMessage, ProcessDataMessage, SimResult,
};

/// Stack error code: session already open
pub const ERR_ALREADY_OPEN: i32 = 1001;
/// Stack error code: session already closed
pub const ERR_ALREADY_CLOSED: i32 = 1002;
/// Stack error code: operation attempted without an open session
pub const ERR_NOT_OPEN: i32 = 1003;
/// Stack error code: transport fault while sending
pub const ERR_TRANSPORT: i32 = 1004;

/// Session-level contract used by the simulation engine
pub trait CommunicationEndpoint {
    fn is_open(&self) -> bool;

    /// Fails if the session is already open or the stack refuses
    fn open(&mut self) -> SimResult<()>;

    /// Fails if the session is not open or the stack refuses
    fn close(&mut self) -> SimResult<()>;

    fn publish_process_data(&mut self, message: &ProcessDataMessage) -> SimResult<()>;

    fn send_message_data(&mut self, message: &MessageDataMessage) -> SimResult<MessageDataAck>;

    /// Drain inbound traffic and dispatch it to registered handlers
    fn poll(&mut self) -> SimResult<()>;

    /// Ordered `<ts> | <message>` lines
    fn telemetry(&self) -> &[String];

    fn diagnostics(&self) -> &[DiagnosticEvent];
}
