//! Capture session state management
//!
//! Defines the session lifecycle state machine, the four capture tasks of a
//! session, and the on-disk layout a session writes to.

use crate::utils::{AppError, AppResult, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Lifecycle of a capture session
///
/// `Created -> Resolving -> Capturing -> Reconciling -> {Completed | Failed}`.
/// Any non-terminal state may also fall straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Lock claimed, nothing started yet
    Created,
    /// Asking the resolver for a stream endpoint
    Resolving,
    /// Capture subprocesses running
    Capturing,
    /// Selecting and muxing the captured files
    Reconciling,
    /// Final artifact produced and verified
    Completed,
    /// Session ended without an artifact
    Failed,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Created
    }
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Created, Resolving)
            | (Resolving, Capturing)
            | (Capturing, Reconciling)
            | (Reconciling, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Resolving => "resolving",
            SessionState::Capturing => "capturing",
            SessionState::Reconciling => "reconciling",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a capture branch records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Video,
    Audio,
}

impl CaptureKind {
    /// File extension of the raw capture
    pub fn extension(&self) -> &'static str {
        match self {
            CaptureKind::Video => "ts",
            CaptureKind::Audio => "aac",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CaptureKind::Video => "video",
            CaptureKind::Audio => "audio",
        }
    }
}

/// Redundancy slot of a capture branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureSlot {
    One,
    Two,
}

impl CaptureSlot {
    pub const ALL: [CaptureSlot; 2] = [CaptureSlot::One, CaptureSlot::Two];

    pub fn number(&self) -> u8 {
        match self {
            CaptureSlot::One => 1,
            CaptureSlot::Two => 2,
        }
    }
}

/// One capture subprocess of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTask {
    pub kind: CaptureKind,
    pub slot: CaptureSlot,
    pub output_path: PathBuf,
    /// Exit code once the subprocess has been reaped (None if killed by signal)
    pub exit_status: Option<i32>,
}

impl CaptureTask {
    fn new(kind: CaptureKind, slot: CaptureSlot, output_path: PathBuf) -> Self {
        Self {
            kind,
            slot,
            output_path,
            exit_status: None,
        }
    }

    /// Short name used in logs, e.g. `video#1`
    pub fn name(&self) -> String {
        format!("{}#{}", self.kind.label(), self.slot.number())
    }
}

/// Where a session writes its files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLayout {
    /// Temporary working directory for raw captures and mux intermediates
    pub work_dir: PathBuf,
    /// Where divergent redundant copies are kept for inspection
    pub archive_dir: PathBuf,
    /// The deliverable
    pub final_path: PathBuf,
}

impl SessionLayout {
    pub fn new(download_root: &Path, source_id: &str, session_id: &str) -> Self {
        let stem = format!("{}_{}", file_stem(source_id), session_id);
        Self {
            work_dir: download_root.join(".sessions").join(&stem),
            archive_dir: download_root.join("archive").join(&stem),
            final_path: download_root.join(format!("{}.mp4", stem)),
        }
    }
}

/// A single capture session for one source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    pub source_id: String,
    pub session_id: String,
    /// Endpoint returned by the resolver
    pub endpoint: Option<String>,
    /// Always four tasks: video 1, video 2, audio 1, audio 2
    pub tasks: Vec<CaptureTask>,
    pub state: SessionState,
    pub layout: SessionLayout,
    pub started_at: DateTime<Utc>,
}

impl CaptureSession {
    /// Create a session with a fresh identifier and planned output paths
    pub fn new(source_id: &str, download_root: &Path) -> Self {
        Self::with_id(source_id, &new_session_id(), download_root)
    }

    pub fn with_id(source_id: &str, session_id: &str, download_root: &Path) -> Self {
        let layout = SessionLayout::new(download_root, source_id, session_id);
        let stem = file_stem(source_id);

        let mut tasks = Vec::with_capacity(4);
        for kind in [CaptureKind::Video, CaptureKind::Audio] {
            for slot in CaptureSlot::ALL {
                let file_name = format!(
                    "{}_{}_{}_{}.{}",
                    stem,
                    kind.label(),
                    slot.number(),
                    session_id,
                    kind.extension()
                );
                tasks.push(CaptureTask::new(kind, slot, layout.work_dir.join(file_name)));
            }
        }

        Self {
            source_id: source_id.to_string(),
            session_id: session_id.to_string(),
            endpoint: None,
            tasks,
            state: SessionState::Created,
            layout,
            started_at: Utc::now(),
        }
    }

    /// Move to the next lifecycle state
    pub fn advance(&mut self, next: SessionState) -> AppResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "{} -> {} for session {}",
                self.state, next, self.session_id
            )));
        }
        tracing::debug!(
            "Session {} ({}): {} -> {}",
            self.session_id,
            self.source_id,
            self.state,
            next
        );
        self.state = next;
        Ok(())
    }

    /// Output paths of all four capture tasks
    pub fn planned_paths(&self) -> Vec<PathBuf> {
        self.tasks.iter().map(|t| t.output_path.clone()).collect()
    }

    pub fn task(&self, kind: CaptureKind, slot: CaptureSlot) -> Option<&CaptureTask> {
        self.tasks.iter().find(|t| t.kind == kind && t.slot == slot)
    }

    /// Paths of the two redundant branches of one kind, slot 1 first
    pub fn pair(&self, kind: CaptureKind) -> Option<(PathBuf, PathBuf)> {
        let one = self.task(kind, CaptureSlot::One)?;
        let two = self.task(kind, CaptureSlot::Two)?;
        Some((one.output_path.clone(), two.output_path.clone()))
    }
}

/// How a session ended
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub source_id: String,
    pub session_id: String,
    /// Terminal state (`Completed` or `Failed`)
    pub state: SessionState,
    /// Set when the session completed
    pub final_path: Option<PathBuf>,
    /// Set when the session failed
    pub error: Option<ErrorKind>,
    /// Human-readable failure detail
    pub message: Option<String>,
}

impl SessionReport {
    pub fn completed(session: &CaptureSession, final_path: PathBuf) -> Self {
        Self {
            source_id: session.source_id.clone(),
            session_id: session.session_id.clone(),
            state: SessionState::Completed,
            final_path: Some(final_path),
            error: None,
            message: None,
        }
    }

    pub fn failed(session: &CaptureSession, error: &AppError) -> Self {
        Self {
            source_id: session.source_id.clone(),
            session_id: session.session_id.clone(),
            state: SessionState::Failed,
            final_path: None,
            error: Some(error.kind()),
            message: Some(error.to_string()),
        }
    }

    /// Failure of a session whose state was lost, e.g. a panicked supervisor
    pub fn aborted(source_id: &str, session_id: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            session_id: session_id.to_string(),
            state: SessionState::Failed,
            final_path: None,
            error: Some(kind),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == SessionState::Completed
    }
}

/// `<UTC timestamp>-<6 hex chars>`
pub fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), &suffix[..6])
}

/// Make a source identifier safe to use inside a file name
fn file_stem(source_id: &str) -> String {
    source_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
