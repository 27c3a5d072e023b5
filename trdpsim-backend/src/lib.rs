//! Library crate exposing modules for testing
//!
//! This exposes internal modules for integration tests

pub mod communication;
pub mod config;
pub mod device;
pub mod manifest;
pub mod scenario;
pub mod utils;
