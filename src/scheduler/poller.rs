//! Liveness poller
//!
//! Polls the tracked sources on a fixed interval (or early on a force
//! check), claims the single-flight flag of every live source and hands it
//! to a capture supervisor running on its own task.

use super::table::{ClaimOutcome, SourceStateTable};
use crate::config::RecorderConfig;
use crate::context::AppContext;
use crate::recorder::{new_session_id, CaptureSupervisor, SessionReport};
use crate::utils::ErrorKind;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Timing of the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
    pub startup_delay: Duration,
    /// Upper bound for joining in-flight sessions on shutdown
    pub shutdown_timeout: Duration,
}

impl From<&RecorderConfig> for SchedulerConfig {
    fn from(config: &RecorderConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            probe_timeout: config.probe_timeout(),
            startup_delay: config.startup_delay(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Result of one liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessOutcome {
    Live,
    NotLive,
    /// The probe overran its deadline; handled as not live
    TimedOut,
}

/// What a single poll cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Sources whose liveness was checked
    pub checked: usize,
    /// Sources skipped because a session already holds them
    pub skipped: usize,
    /// Sources a new session was started for
    pub started: Vec<String>,
}

/// Liveness polling scheduler
pub struct Scheduler {
    ctx: Arc<AppContext>,
    supervisor: Arc<CaptureSupervisor>,
    table: Arc<SourceStateTable>,
    force_check: Notify,
    shutdown: CancellationToken,
    /// Held across the cancellation check and the spawn of a session, and
    /// while shutdown cancels, so no session is spawned after shutdown began
    launch_gate: Mutex<()>,
    sessions: TaskTracker,
}

impl Scheduler {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            supervisor: Arc::new(CaptureSupervisor::new(Arc::clone(&ctx))),
            ctx,
            table: Arc::new(SourceStateTable::new()),
            force_check: Notify::new(),
            shutdown: CancellationToken::new(),
            launch_gate: Mutex::new(()),
            sessions: TaskTracker::new(),
        }
    }

    /// Wake the poller early. The regular schedule is unchanged.
    pub fn force_check(&self) {
        tracing::debug!("Force check requested");
        self.force_check.notify_one();
    }

    /// Clear a source's capture flag regardless of the owning session
    pub fn mark_finished(&self, source_id: &str) -> bool {
        let cleared = self.table.mark_finished(source_id);
        if cleared {
            tracing::info!("Manually marked '{}' as finished", source_id);
        }
        cleared
    }

    pub fn is_capturing(&self, source_id: &str) -> bool {
        self.table.is_capturing(source_id)
    }

    pub fn capturing_sources(&self) -> Vec<String> {
        self.table.capturing_sources()
    }

    /// Number of capture sessions still running
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Run the probe for one source, bounded by the probe timeout.
    ///
    /// Errors, panics and timeouts all count as not live.
    pub async fn check_liveness(&self, source_id: &str) -> LivenessOutcome {
        let probe = Arc::clone(&self.ctx.probe);
        let source = source_id.to_string();
        let mut check = tokio::spawn(async move { probe.is_live(&source).await });

        let result = tokio::time::timeout(self.ctx.scheduler.probe_timeout, &mut check).await;
        match result {
            Ok(Ok(Ok(true))) => LivenessOutcome::Live,
            Ok(Ok(Ok(false))) => LivenessOutcome::NotLive,
            Ok(Ok(Err(e))) => {
                tracing::warn!("Liveness probe for '{}' failed: {}", source_id, e);
                LivenessOutcome::NotLive
            }
            Ok(Err(e)) => {
                tracing::warn!("Liveness probe for '{}' aborted: {}", source_id, e);
                LivenessOutcome::NotLive
            }
            Err(_) => {
                // Dropping the probe future kills its child process
                check.abort();
                tracing::warn!(
                    "Liveness probe timed out for '{}' after {:?}",
                    source_id,
                    self.ctx.scheduler.probe_timeout
                );
                LivenessOutcome::TimedOut
            }
        }
    }

    /// Run one poll cycle over a snapshot of the tracked sources
    pub async fn poll(&self) -> PollSummary {
        let mut summary = PollSummary::default();
        let sources = self.ctx.settings.tracked_sources();
        if sources.is_empty() {
            tracing::debug!("No tracked sources");
            return summary;
        }

        tracing::debug!("Polling {} tracked source(s)", sources.len());
        for source_id in sources {
            if self.shutdown.is_cancelled() {
                break;
            }
            if self.table.is_capturing(&source_id) {
                summary.skipped += 1;
                continue;
            }

            summary.checked += 1;
            if self.check_liveness(&source_id).await != LivenessOutcome::Live {
                continue;
            }
            if self.start_session(&source_id) {
                summary.started.push(source_id);
            } else {
                summary.skipped += 1;
            }
        }

        summary
    }

    /// Claim a source and spawn its capture session.
    ///
    /// Returns false if another session already holds the source.
    fn start_session(&self, source_id: &str) -> bool {
        let _gate = self.launch_gate.lock();
        if self.shutdown.is_cancelled() {
            return false;
        }

        let session_id = new_session_id();
        let claim = match self.table.try_claim(source_id, &session_id) {
            ClaimOutcome::Claimed(claim) => claim,
            ClaimOutcome::AlreadyCapturing => {
                tracing::debug!("'{}' is already capturing, skipping", source_id);
                return false;
            }
        };
        tracing::info!("'{}' is live, starting session {}", source_id, session_id);

        let supervisor = Arc::clone(&self.supervisor);
        let notifier = Arc::clone(&self.ctx.notifier);
        let cancel = self.shutdown.child_token();
        let source_id = source_id.to_string();

        self.sessions.spawn(async move {
            let source = source_id.clone();
            let run = tokio::spawn(async move { supervisor.run(claim, &source, cancel).await });

            // A panicking supervisor drops its claim while unwinding; the
            // finish notification is still owed
            if let Err(e) = run.await {
                tracing::error!("Capture session {} for '{}' aborted: {}", session_id, source_id, e);
                let report = SessionReport::aborted(
                    &source_id,
                    &session_id,
                    ErrorKind::Internal,
                    format!("session task aborted: {}", e),
                );
                notifier.session_finished(&report).await;
            }
        });

        true
    }

    /// Poll until shut down
    pub async fn run(&self) {
        let interval = self.ctx.scheduler.poll_interval;
        let delay = self.ctx.scheduler.startup_delay;
        tracing::info!("Scheduler started, polling every {:?}", interval);

        if !delay.is_zero() {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        while !self.shutdown.is_cancelled() {
            let summary = self.poll().await;
            if !summary.started.is_empty() {
                tracing::info!("Started capture for {:?}", summary.started);
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.force_check.notified() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Stop polling, stop in-flight captures and wait for their sessions.
    ///
    /// Returns false if sessions were still running when the shutdown
    /// timeout elapsed.
    pub async fn shutdown(&self) -> bool {
        tracing::info!(
            "Shutting down scheduler with {} active session(s)",
            self.sessions.len()
        );
        {
            let _gate = self.launch_gate.lock();
            self.shutdown.cancel();
        }
        self.sessions.close();

        let timeout = self.ctx.scheduler.shutdown_timeout;
        match tokio::time::timeout(timeout, self.sessions.wait()).await {
            Ok(()) => {
                tracing::info!("All capture sessions finished");
                true
            }
            Err(_) => {
                tracing::warn!(
                    "{} capture session(s) still running after {:?}",
                    self.sessions.len(),
                    timeout
                );
                false
            }
        }
    }
}
