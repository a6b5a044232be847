//! Tracks which application window holds focus, splits that into sessions, and stores them
//! together with per-tick activity samples in a local SQLite database.
//!
//! [daemon::tracker::ActivityTracker] is the entry point for embedding the engine.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod utils;
pub mod window_api;
