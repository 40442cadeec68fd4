//! Configuration module
//!
//! Recorder settings and the store the scheduler reads them from.

pub mod settings;
pub mod store;

pub use settings::{RecorderConfig, ToolPaths};
pub use store::{normalize_sources, SettingsStore, SharedSettings};
