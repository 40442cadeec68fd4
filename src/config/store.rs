//! Settings store
//!
//! The recorder only reads settings; the command layer that edits them is
//! an external collaborator and talks to [`SharedSettings`] directly.

use super::settings::RecorderConfig;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::PathBuf;

/// Read-only view of the settings the recorder needs
pub trait SettingsStore: Send + Sync {
    /// Root directory for all recorder output
    fn download_root(&self) -> PathBuf;

    /// Ordered, de-duplicated snapshot of the tracked sources
    fn tracked_sources(&self) -> Vec<String>;
}

/// In-memory settings shared between the recorder and its command layer
pub struct SharedSettings {
    inner: RwLock<RecorderConfig>,
}

impl SharedSettings {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> RecorderConfig {
        self.inner.read().clone()
    }

    /// Start tracking a source. Returns false if it was already tracked.
    pub fn add_source(&self, source_id: &str) -> bool {
        let source_id = source_id.trim();
        if source_id.is_empty() {
            return false;
        }
        let mut config = self.inner.write();
        if config
            .tracked_sources
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(source_id))
        {
            return false;
        }
        config.tracked_sources.push(source_id.to_string());
        true
    }

    /// Stop tracking a source. Returns false if it was not tracked.
    pub fn remove_source(&self, source_id: &str) -> bool {
        let source_id = source_id.trim();
        let mut config = self.inner.write();
        let before = config.tracked_sources.len();
        config
            .tracked_sources
            .retain(|s| !s.trim().eq_ignore_ascii_case(source_id));
        config.tracked_sources.len() != before
    }

    pub fn set_download_root(&self, path: PathBuf) {
        self.inner.write().download_root = path;
    }
}

impl SettingsStore for SharedSettings {
    fn download_root(&self) -> PathBuf {
        self.inner.read().download_root.clone()
    }

    fn tracked_sources(&self) -> Vec<String> {
        // Clone under the lock, normalise outside it
        let raw = self.inner.read().tracked_sources.clone();
        normalize_sources(raw)
    }
}

/// Trim, drop blanks, and de-duplicate case-insensitively keeping first spelling
pub fn normalize_sources<I>(sources: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}
