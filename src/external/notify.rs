//! Notification sinks
//!
//! The chat front end is an external collaborator; it subscribes to the
//! broadcast channel. `LogNotifier` is used when nothing subscribes.

use super::Notifier;
use crate::recorder::state::SessionReport;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Events emitted over a session's lifetime
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Capture is about to start
    Started {
        source_id: String,
        session_id: String,
        planned_paths: Vec<PathBuf>,
    },
    /// Session reached a terminal state
    Finished(SessionReport),
}

/// Writes notifications to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn session_started(&self, source_id: &str, session_id: &str, planned_paths: &[PathBuf]) {
        tracing::info!(
            "Capture of '{}' started (session {}), files: {:?}",
            source_id,
            session_id,
            planned_paths
        );
    }

    async fn session_finished(&self, report: &SessionReport) {
        match (&report.final_path, report.error) {
            (Some(path), _) => tracing::info!(
                "Capture of '{}' finished (session {}): {:?}",
                report.source_id,
                report.session_id,
                path
            ),
            (None, kind) => tracing::warn!(
                "Capture of '{}' failed (session {}): {:?} {}",
                report.source_id,
                report.session_id,
                kind,
                report.message.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Fans session events out to any number of subscribers
pub struct BroadcastNotifier {
    event_tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self { event_tx }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn session_started(&self, source_id: &str, session_id: &str, planned_paths: &[PathBuf]) {
        LogNotifier.session_started(source_id, session_id, planned_paths).await;
        // No subscribers is not an error
        let _ = self.event_tx.send(SessionEvent::Started {
            source_id: source_id.to_string(),
            session_id: session_id.to_string(),
            planned_paths: planned_paths.to_vec(),
        });
    }

    async fn session_finished(&self, report: &SessionReport) {
        LogNotifier.session_finished(report).await;
        let _ = self.event_tx.send(SessionEvent::Finished(report.clone()));
    }
}
