//! Dirsync LDAP -- directory synchronization engine.
//!
//! This crate reads people from an LDAP directory and reconciles them with
//! the local user store: planning creates, updates and deactivations,
//! applying them as a cancellable background run, and recording every run
//! and its log entries for later inspection.

pub mod client;
pub mod config_gate;
pub mod coordinator;
pub mod job;
pub mod log_sink;
pub mod planner;
pub mod progress;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;
