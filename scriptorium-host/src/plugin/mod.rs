//! # Plugin Management
//!
//! Manages Scriptorium plugins for the host.
//!
//! This module provides:
//! - Plugin discovery and catalog swaps on rescan
//! - Enable/disable that survives rescans
//! - A FIFO launch queue served by one worker thread

mod manager;
mod queue;

pub use manager::PluginManager;
pub use queue::{LaunchObserver, LaunchTicket};
