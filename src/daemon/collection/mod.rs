//! Everything that happens inside one polling tick: reading input signals, classifying the
//! focused window, sampling resource usage, and the loop driving it all.

pub mod activity;
pub mod afk;
pub mod classifier;
pub mod collector;
pub mod resources;
