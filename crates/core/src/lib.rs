//! Dirsync Core: configuration, models, errors and the SQLite store used by
//! the directory synchronization engine.

pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod models;
