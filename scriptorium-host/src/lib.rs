//! Scriptorium host library
//!
//! This module exports the internal components of the host for the binary
//! and for integration tests.

pub mod config;
pub mod logging;
pub mod plugin;
