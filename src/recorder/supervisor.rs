//! Capture session supervisor
//!
//! Runs one session from endpoint resolution to a reconciled artifact and
//! guarantees the source's capture lock is released exactly once.

use super::state::{CaptureSession, SessionReport, SessionState};
use crate::context::AppContext;
use crate::external::CaptureHandle;
use crate::reconcile::{ReconcileStage, ReconciliationEngine};
use crate::scheduler::SourceClaim;
use crate::utils::{AppError, AppResult};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Drives capture sessions to completion
pub struct CaptureSupervisor {
    ctx: Arc<AppContext>,
    engine: ReconciliationEngine,
}

impl CaptureSupervisor {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let engine = ReconciliationEngine::new(Arc::clone(&ctx.transcoder));
        Self { ctx, engine }
    }

    /// Run a session for a claimed source.
    ///
    /// Cancelling `cancel` kills the capture subprocesses; whatever they
    /// captured is still reconciled.
    pub async fn run(&self, claim: SourceClaim, source_id: &str, cancel: CancellationToken) -> SessionReport {
        let download_root = self.ctx.settings.download_root();
        let mut session = CaptureSession::with_id(source_id, claim.session_id(), &download_root);

        tracing::info!(
            "Starting capture session {} for '{}'",
            session.session_id,
            session.source_id
        );
        self.ctx
            .notifier
            .session_started(&session.source_id, &session.session_id, &session.planned_paths())
            .await;

        let report = match self.drive(&mut session, &cancel).await {
            Ok(final_path) => {
                let elapsed = Utc::now().signed_duration_since(session.started_at);
                tracing::info!(
                    "Capture session {} for '{}' completed in {}s",
                    session.session_id,
                    session.source_id,
                    elapsed.num_seconds()
                );
                SessionReport::completed(&session, final_path)
            }
            Err(e) => {
                tracing::error!(
                    "Capture session {} for '{}' failed in state {}: {}",
                    session.session_id,
                    session.source_id,
                    session.state,
                    e
                );
                if let Err(transition) = session.advance(SessionState::Failed) {
                    tracing::warn!("{}", transition);
                }
                SessionReport::failed(&session, &e)
            }
        };

        drop(claim);
        self.ctx.notifier.session_finished(&report).await;
        report
    }

    async fn drive(&self, session: &mut CaptureSession, cancel: &CancellationToken) -> AppResult<PathBuf> {
        session.advance(SessionState::Resolving)?;
        let endpoint = self.resolve(&session.source_id).await?;
        tracing::info!("Resolved '{}' to {}", session.source_id, endpoint);
        session.endpoint = Some(endpoint.clone());

        tokio::fs::create_dir_all(&session.layout.work_dir).await?;
        session.advance(SessionState::Capturing)?;
        self.capture(session, &endpoint, cancel).await?;

        session.advance(SessionState::Reconciling)?;
        let session_id = session.session_id.clone();
        let result = self
            .engine
            .run(session, |stage: ReconcileStage| {
                tracing::debug!("Session {} reconcile stage: {:?}", session_id, stage);
            })
            .await?;

        session.advance(SessionState::Completed)?;
        Ok(result.final_artifact_path)
    }

    async fn resolve(&self, source_id: &str) -> AppResult<String> {
        match self.ctx.resolver.resolve(source_id).await {
            Ok(Some(endpoint)) if !endpoint.trim().is_empty() => Ok(endpoint.trim().to_string()),
            Ok(_) => Err(AppError::Resolution(format!(
                "no endpoint returned for '{}'",
                source_id
            ))),
            Err(e) => Err(AppError::Resolution(format!(
                "resolver failed for '{}': {}",
                source_id, e
            ))),
        }
    }

    /// Launch all four capture tasks and wait for every one of them to exit
    async fn capture(
        &self,
        session: &mut CaptureSession,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        let mut handles: Vec<(usize, Box<dyn CaptureHandle>)> = Vec::with_capacity(session.tasks.len());

        for (index, task) in session.tasks.iter().enumerate() {
            match self.ctx.launcher.launch(endpoint, task) {
                Ok(handle) => {
                    tracing::info!("Started {} capture -> {:?}", task.name(), task.output_path);
                    handles.push((index, handle));
                }
                Err(e) => {
                    tracing::error!("Failed to start {} capture: {}", task.name(), e);
                    for (index, mut handle) in handles {
                        if let Err(e) = handle.start_kill() {
                            tracing::warn!("Failed to stop capture task {}: {}", index, e);
                        }
                        if let Err(e) = handle.wait().await {
                            tracing::warn!("Failed to reap capture task {}: {}", index, e);
                        }
                    }
                    return Err(AppError::CaptureLaunch(format!("{}: {}", task.name(), e)));
                }
            }
        }

        // A failing branch must not stop its siblings
        let mut waits = JoinSet::new();
        for (index, mut handle) in handles {
            let cancel = cancel.clone();
            waits.spawn(async move {
                tokio::select! {
                    status = handle.wait() => return (index, status),
                    _ = cancel.cancelled() => {}
                }
                if let Err(e) = handle.start_kill() {
                    tracing::warn!("Failed to stop capture task {}: {}", index, e);
                }
                (index, handle.wait().await)
            });
        }

        while let Some(joined) = waits.join_next().await {
            let (index, status) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Capture wait task aborted: {}", e);
                    continue;
                }
            };
            let task = &mut session.tasks[index];
            match status {
                Ok(Some(0)) => {
                    task.exit_status = Some(0);
                    tracing::info!("{} capture finished", task.name());
                }
                Ok(code) => {
                    task.exit_status = code;
                    tracing::warn!("{} capture exited with {:?}", task.name(), code);
                }
                Err(e) => tracing::warn!("Failed to wait for {} capture: {}", task.name(), e),
            }
        }

        let clean = session
            .tasks
            .iter()
            .filter(|t| t.exit_status == Some(0))
            .count();
        tracing::info!(
            "{} of {} capture branches exited cleanly",
            clean,
            session.tasks.len()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::SessionEvent;
    use crate::reconcile::MuxStep;
    use crate::recorder::state::{CaptureKind, CaptureSlot};
    use crate::scheduler::{ClaimOutcome, SourceStateTable};
    use crate::testing::{FakeLauncher, FakeTranscoder, Fakes, FixedResolver};
    use crate::utils::ErrorKind;
    use std::time::Duration;

    fn claim(table: &Arc<SourceStateTable>, source: &str) -> SourceClaim {
        match table.try_claim(source, "20260101-000000-abcdef") {
            ClaimOutcome::Claimed(claim) => claim,
            ClaimOutcome::AlreadyCapturing => panic!("source already claimed"),
        }
    }

    #[tokio::test]
    async fn test_successful_session_completes_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let fakes = Fakes::new(dir.path(), &["foo"]);
        let mut events = fakes.notifier.subscribe();
        let supervisor = CaptureSupervisor::new(Arc::new(fakes.context()));
        let table = Arc::new(SourceStateTable::new());

        let report = supervisor
            .run(claim(&table, "foo"), "foo", CancellationToken::new())
            .await;

        assert!(report.is_success(), "{:?}", report);
        let final_path = report.final_path.unwrap();
        assert!(std::fs::metadata(&final_path).unwrap().len() > 0);
        assert!(!table.is_capturing("foo"));
        assert_eq!(fakes.launcher.launched().len(), 4);
        assert_eq!(fakes.transcoder.steps(), MuxStep::ORDER.to_vec());

        match events.recv().await.unwrap() {
            SessionEvent::Started { planned_paths, .. } => assert_eq!(planned_paths.len(), 4),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Finished(_)));
    }

    #[tokio::test]
    async fn test_empty_endpoint_fails_without_launching() {
        let dir = tempfile::tempdir().unwrap();
        let mut fakes = Fakes::new(dir.path(), &["foo"]);
        fakes.resolver = Arc::new(FixedResolver::new(Some("  ")));
        let mut events = fakes.notifier.subscribe();
        let supervisor = CaptureSupervisor::new(Arc::new(fakes.context()));
        let table = Arc::new(SourceStateTable::new());

        let report = supervisor
            .run(claim(&table, "foo"), "foo", CancellationToken::new())
            .await;

        assert_eq!(report.state, SessionState::Failed);
        assert_eq!(report.error, Some(ErrorKind::ResolutionFailure));
        assert!(fakes.launcher.launched().is_empty());
        assert!(!table.is_capturing("foo"));

        let _started = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            SessionEvent::Finished(r) => assert_eq!(r.error, Some(ErrorKind::ResolutionFailure)),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_launch_failure_stops_started_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let mut fakes = Fakes::new(dir.path(), &["foo"]);
        // Handles never exit on their own; only the kill path can end them
        fakes.launcher = Arc::new(FakeLauncher::default().failing_on(2));
        let supervisor = CaptureSupervisor::new(Arc::new(fakes.context()));
        let table = Arc::new(SourceStateTable::new());

        let report = supervisor
            .run(claim(&table, "foo"), "foo", CancellationToken::new())
            .await;

        assert_eq!(report.error, Some(ErrorKind::CaptureLaunchFailure));
        assert_eq!(fakes.launcher.launched().len(), 2);
        assert!(fakes.transcoder.steps().is_empty());
        assert!(!table.is_capturing("foo"));
    }

    #[tokio::test]
    async fn test_failed_branch_does_not_cancel_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut fakes = Fakes::new(dir.path(), &["foo"]);
        // video#1 crashes at once with a short file; the others keep running
        // until released, and audio#2 then exits non-zero as well
        fakes.launcher = Arc::new(
            FakeLauncher::default()
                .exits_early(0, 1)
                .exit_code(3, 1)
                .payload(0, b"short")
                .payload(1, b"the complete video stream"),
        );
        let launcher = Arc::clone(&fakes.launcher);
        let supervisor = CaptureSupervisor::new(Arc::new(fakes.context()));
        let table = Arc::new(SourceStateTable::new());

        let run = supervisor.run(claim(&table, "foo"), "foo", CancellationToken::new());
        let (report, _) = tokio::join!(run, async {
            while launcher.launched().len() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(table.is_capturing("foo"), "session ended with siblings still running");
            assert_eq!(launcher.kills(), 0);
            launcher.release();
        });

        assert!(report.is_success(), "{:?}", report);
        assert_eq!(launcher.kills(), 0);
        let session = CaptureSession::with_id("foo", &report.session_id, dir.path());
        let archived = session.layout.archive_dir.join(
            session
                .task(CaptureKind::Video, CaptureSlot::One)
                .unwrap()
                .output_path
                .file_name()
                .unwrap(),
        );
        assert_eq!(std::fs::read(archived).unwrap(), b"short");
        let final_bytes = std::fs::read(report.final_path.unwrap()).unwrap();
        assert!(final_bytes.starts_with(b"the complete video stream"));
    }

    #[tokio::test]
    async fn test_launch_failure_kills_each_started_sibling_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut fakes = Fakes::new(dir.path(), &["foo"]);
        fakes.launcher = Arc::new(FakeLauncher::default().failing_on(3));
        let supervisor = CaptureSupervisor::new(Arc::new(fakes.context()));
        let table = Arc::new(SourceStateTable::new());

        let report = supervisor
            .run(claim(&table, "foo"), "foo", CancellationToken::new())
            .await;

        assert_eq!(report.error, Some(ErrorKind::CaptureLaunchFailure));
        assert_eq!(fakes.launcher.kills(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_kills_captures_and_reconciles() {
        let dir = tempfile::tempdir().unwrap();
        let mut fakes = Fakes::new(dir.path(), &["foo"]);
        fakes.launcher = Arc::new(FakeLauncher::default());
        let supervisor = CaptureSupervisor::new(Arc::new(fakes.context()));
        let table = Arc::new(SourceStateTable::new());
        let cancel = CancellationToken::new();

        let run = supervisor.run(claim(&table, "foo"), "foo", cancel.clone());
        let (report, _) = tokio::join!(run, async {
            tokio::task::yield_now().await;
            cancel.cancel();
        });

        assert!(report.is_success(), "{:?}", report);
        assert!(!table.is_capturing("foo"));
    }

    #[tokio::test]
    async fn test_mux_failure_reports_kind_and_keeps_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut fakes = Fakes::new(dir.path(), &["foo"]);
        fakes.transcoder = Arc::new(FakeTranscoder::failing_at(MuxStep::FinalMux));
        let supervisor = CaptureSupervisor::new(Arc::new(fakes.context()));
        let table = Arc::new(SourceStateTable::new());

        let report = supervisor
            .run(claim(&table, "foo"), "foo", CancellationToken::new())
            .await;

        assert_eq!(report.error, Some(ErrorKind::MuxStepFailure));
        assert!(report.message.unwrap().contains("simulated failure"));
        let session = CaptureSession::with_id("foo", &report.session_id, dir.path());
        assert!(session.layout.work_dir.exists());
        assert!(!table.is_capturing("foo"));
    }
}
