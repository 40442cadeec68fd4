//! Recorder configuration
//!
//! Settings are stored as camelCase JSON. Every field has a default so a
//! partial (or missing) file still produces a usable configuration.

use crate::utils::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder replaced by the (URL-encoded) source identifier
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Paths of the external tools the recorder drives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolPaths {
    /// Transcoder used for capture and muxing
    pub ffmpeg: String,
    /// Resolver used for liveness probes and endpoint resolution
    pub yt_dlp: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            yt_dlp: "yt-dlp".to_string(),
        }
    }
}

/// Top-level recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Root directory for captures, archives and final artifacts
    pub download_root: PathBuf,

    /// Source identifiers to watch
    pub tracked_sources: Vec<String>,

    /// Seconds between scheduled poll cycles
    pub poll_interval_secs: u64,

    /// Seconds a liveness probe may run before it is killed
    pub probe_timeout_secs: u64,

    /// Seconds to wait before the first poll cycle
    pub startup_delay_secs: u64,

    /// Seconds to wait for in-flight sessions on shutdown
    pub shutdown_timeout_secs: u64,

    /// Page URL of a source; `{source}` is replaced by its identifier
    pub source_url_template: String,

    /// Bitrate of the AAC audio capture branches
    pub audio_bitrate: String,

    /// External tool locations
    pub tools: ToolPaths,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from("Downloads"),
            tracked_sources: Vec::new(),
            poll_interval_secs: 60,
            probe_timeout_secs: 30,
            startup_delay_secs: 2,
            shutdown_timeout_secs: 30,
            source_url_template: format!("https://www.twitch.tv/{}", SOURCE_PLACEHOLDER),
            audio_bitrate: "160k".to_string(),
            tools: ToolPaths::default(),
        }
    }
}

impl RecorderConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: RecorderConfig = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        config.validate()?;

        tracing::debug!(
            "Loaded config from {:?}: {} tracked sources",
            path,
            config.tracked_sources.len()
        );
        Ok(config)
    }

    /// Reject values the scheduler cannot work with
    pub fn validate(&self) -> AppResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(AppError::Config("pollIntervalSecs must be positive".into()));
        }
        if self.probe_timeout_secs == 0 {
            return Err(AppError::Config("probeTimeoutSecs must be positive".into()));
        }
        if !self.source_url_template.contains(SOURCE_PLACEHOLDER) {
            return Err(AppError::Config(format!(
                "sourceUrlTemplate must contain {}",
                SOURCE_PLACEHOLDER
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Substitute a URL-encoded source identifier into a page URL template
pub fn expand_source_url(template: &str, source_id: &str) -> String {
    template.replace(SOURCE_PLACEHOLDER, &urlencoding::encode(source_id))
}
