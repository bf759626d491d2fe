//! CLI module for the bgremove-batch library
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;
mod progress;

pub use main_impl::{main, Cli, CliOutputFormat};
pub use progress::IndicatifProgressReporter;
