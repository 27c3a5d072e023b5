//! Utilities module for the simulator backend.
//!
//! Small helpers shared by the repositories and the engine: content
//! checksums, identifier slugs, UTC timestamps and best-effort cleanup.

pub mod checksum;
pub mod error_handling;
pub mod naming;
pub mod time;

pub use checksum::{checksum_bytes, checksum_file};
pub use naming::{sanitize_id, unique_id};
pub use time::{compact_timestamp, iso_timestamp, now_iso};
