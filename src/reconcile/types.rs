//! Reconciliation types
//!
//! This module defines the mux steps, progress stages, selection outcomes
//! and errors of the reconciliation engine.

use crate::recorder::state::CaptureKind;
use crate::utils::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The three transcoder invocations that build the final artifact, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuxStep {
    /// Re-encode the canonical audio into a mux-portable codec
    AudioTranscode,
    /// Drop audio from the canonical video without re-encoding
    VideoStrip,
    /// Combine one video and one audio track into the final container
    FinalMux,
}

impl MuxStep {
    pub const ORDER: [MuxStep; 3] = [MuxStep::AudioTranscode, MuxStep::VideoStrip, MuxStep::FinalMux];

    pub fn name(&self) -> &'static str {
        match self {
            MuxStep::AudioTranscode => "audio_transcode",
            MuxStep::VideoStrip => "video_strip",
            MuxStep::FinalMux => "final_mux",
        }
    }

    /// Number of input files the step consumes
    pub fn input_count(&self) -> usize {
        match self {
            MuxStep::AudioTranscode | MuxStep::VideoStrip => 1,
            MuxStep::FinalMux => 2,
        }
    }
}

impl fmt::Display for MuxStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one transcoder invocation
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Captured diagnostic text (stderr)
    pub diagnostic: String,
}

/// Reconciliation progress stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ReconcileStage {
    /// Hashing the redundant pairs
    Comparing,
    /// Running one mux step
    Muxing { step: MuxStep },
    /// Reading back the final artifact
    Verifying,
    /// Removing the working directory
    CleaningUp,
    /// Artifact verified
    Complete,
}

/// Why one file of a pair was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionReason {
    /// Both copies are byte-identical
    IdenticalContent,
    /// Copies diverge; the larger one is assumed more complete
    LargerFile,
}

/// What happened to the non-selected file of a pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Disposition {
    /// Exact duplicate, removed
    Deleted,
    /// Divergent copy, moved here for inspection
    Archived(PathBuf),
    /// The branch never produced a file
    Missing,
}

/// Selection outcome for one redundant pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairSelection {
    pub kind: CaptureKind,
    pub chosen: PathBuf,
    pub discarded: PathBuf,
    pub reason: SelectionReason,
    pub disposition: Disposition,
}

/// Outcome of a successful reconciliation.
///
/// Chosen and discarded paths record where the captures were read from.
/// They live in the session working directory, which is gone by the time
/// the result is returned; only the artifact and archive paths still exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub chosen_video_path: PathBuf,
    pub chosen_audio_path: PathBuf,
    pub final_artifact_path: PathBuf,
    pub discarded_paths: Vec<PathBuf>,
    /// Where divergent discarded files were moved
    pub archived_paths: Vec<PathBuf>,
    /// Bytes read back from the final artifact
    pub artifact_bytes: u64,
}

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{step} exited unsuccessfully: {diagnostic}")]
    MuxStep { step: MuxStep, diagnostic: String },

    #[error("{0}")]
    Integrity(String),
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> AppError {
        match e {
            ReconcileError::Io(e) => AppError::Io(e),
            ReconcileError::MuxStep { step, diagnostic } => AppError::MuxStep {
                step: step.name().to_string(),
                diagnostic,
            },
            ReconcileError::Integrity(msg) => AppError::Integrity(msg),
        }
    }
}
