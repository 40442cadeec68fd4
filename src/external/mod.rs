//! External collaborators
//!
//! The recorder drives external tools (a stream resolver and a transcoder)
//! and reports to a notification sink. Each is consumed through a narrow
//! trait so the scheduler and supervisor can be exercised without them.

pub mod ffmpeg;
pub mod notify;
pub mod ytdlp;

use crate::reconcile::types::{MuxStep, StepOutput};
use crate::recorder::state::{CaptureTask, SessionReport};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

pub use ffmpeg::{FfmpegCapture, FfmpegTranscoder};
pub use notify::{BroadcastNotifier, LogNotifier, SessionEvent};
pub use ytdlp::YtDlp;

/// Checks whether a source is currently producing content.
///
/// Implementations must be cancel-safe: the caller enforces the timeout by
/// dropping the future, and any child process must die with it.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_live(&self, source_id: &str) -> io::Result<bool>;
}

/// Turns a source identifier into a capturable stream endpoint
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// `Ok(None)` when the resolver ran but produced no endpoint
    async fn resolve(&self, source_id: &str) -> io::Result<Option<String>>;
}

/// A running capture subprocess
#[async_trait]
pub trait CaptureHandle: Send {
    /// Block until the subprocess exits; returns its exit code if it had one
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Ask the subprocess to terminate without waiting for it
    fn start_kill(&mut self) -> io::Result<()>;
}

/// Starts capture subprocesses
pub trait CaptureLauncher: Send + Sync {
    fn launch(&self, endpoint: &str, task: &CaptureTask) -> io::Result<Box<dyn CaptureHandle>>;
}

/// Runs blocking mux steps
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(&self, step: MuxStep, inputs: &[PathBuf], output: &Path) -> io::Result<StepOutput>;
}

/// Receives session lifecycle notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn session_started(&self, source_id: &str, session_id: &str, planned_paths: &[PathBuf]);

    async fn session_finished(&self, report: &SessionReport);
}
