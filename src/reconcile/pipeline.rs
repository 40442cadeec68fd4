//! Reconciliation pipeline
//!
//! Turns the four raw captures of a session into one verified artifact:
//! pick the canonical video and audio branch, mux them, read the result
//! back, then clean up. Failed runs leave every file in place.

use super::hash::{file_size, files_match, read_fully};
use super::types::{
    Disposition, MuxStep, PairSelection, ReconcileError, ReconcileStage, ReconciliationResult,
    SelectionReason,
};
use crate::external::Transcoder;
use crate::recorder::state::{CaptureKind, CaptureSession};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Runs selection, muxing and verification for finished sessions
pub struct ReconciliationEngine {
    transcoder: Arc<dyn Transcoder>,
}

impl ReconciliationEngine {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// Reconcile a session whose capture tasks have all exited
    pub async fn run<F>(
        &self,
        session: &CaptureSession,
        progress: F,
    ) -> Result<ReconciliationResult, ReconcileError>
    where
        F: Fn(ReconcileStage) + Send + Sync,
    {
        let layout = &session.layout;
        tracing::info!(
            "Reconciling session {} ({}) in {:?}",
            session.session_id,
            session.source_id,
            layout.work_dir
        );

        // 1. Compare and select each redundant pair
        progress(ReconcileStage::Comparing);
        let video = self.select_kind(session, CaptureKind::Video).await?;
        let audio = self.select_kind(session, CaptureKind::Audio).await?;

        for selection in [&video, &audio] {
            if file_size(&selection.chosen).await == 0 {
                return Err(ReconcileError::Integrity(format!(
                    "no usable {} capture: {:?} is missing or empty",
                    selection.kind.label(),
                    selection.chosen
                )));
            }
        }

        // 2. Mux pipeline, each step must succeed before the next
        let stem = layout
            .final_path
            .file_stem()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| session.session_id.clone().into());
        let audio_out = layout.work_dir.join(with_suffix(&stem, "_audio.mp3"));
        let silent_video = layout.work_dir.join(with_suffix(&stem, "_video_silent.mp4"));
        if let Some(parent) = layout.final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let plan = [
            (MuxStep::AudioTranscode, vec![audio.chosen.clone()], audio_out.clone()),
            (MuxStep::VideoStrip, vec![video.chosen.clone()], silent_video.clone()),
            (
                MuxStep::FinalMux,
                vec![silent_video.clone(), audio_out.clone()],
                layout.final_path.clone(),
            ),
        ];
        for (step, inputs, output) in &plan {
            progress(ReconcileStage::Muxing { step: *step });
            self.run_step(*step, inputs, output).await?;
        }

        // 3. Verify the artifact reads back with content
        progress(ReconcileStage::Verifying);
        let artifact_bytes = verify_artifact(&layout.final_path).await?;

        // 4. Only a fully successful run removes the working directory
        progress(ReconcileStage::CleaningUp);
        if let Err(e) = tokio::fs::remove_dir_all(&layout.work_dir).await {
            tracing::warn!("Failed to remove working directory {:?}: {}", layout.work_dir, e);
        }

        progress(ReconcileStage::Complete);
        tracing::info!(
            "Session {} reconciled: {:?} ({} bytes)",
            session.session_id,
            layout.final_path,
            artifact_bytes
        );

        let archived_paths = [&video, &audio]
            .iter()
            .filter_map(|s| match &s.disposition {
                Disposition::Archived(path) => Some(path.clone()),
                _ => None,
            })
            .collect();

        Ok(ReconciliationResult {
            chosen_video_path: video.chosen,
            chosen_audio_path: audio.chosen,
            final_artifact_path: layout.final_path.clone(),
            discarded_paths: vec![video.discarded, audio.discarded],
            archived_paths,
            artifact_bytes,
        })
    }

    async fn select_kind(
        &self,
        session: &CaptureSession,
        kind: CaptureKind,
    ) -> Result<PairSelection, ReconcileError> {
        let (first, second) = session.pair(kind).ok_or_else(|| {
            ReconcileError::Integrity(format!("session has no {} capture pair", kind.label()))
        })?;
        select_canonical(kind, &first, &second, &session.layout.archive_dir).await
    }

    async fn run_step(
        &self,
        step: MuxStep,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<(), ReconcileError> {
        let result = self.transcoder.run(step, inputs, output).await?;
        if !result.success {
            tracing::error!(
                "Mux step {} failed with {:?}: {}",
                step,
                result.exit_code,
                result.diagnostic
            );
            let diagnostic = if result.diagnostic.is_empty() {
                format!("exit code {:?}", result.exit_code)
            } else {
                result.diagnostic
            };
            return Err(ReconcileError::MuxStep { step, diagnostic });
        }
        tracing::debug!("Mux step {} -> {:?}", step, output);
        Ok(())
    }
}

/// Choose the canonical file of a redundant pair.
///
/// Identical copies: keep `first`, delete `second`. Diverging copies: keep
/// the larger (ties keep `first`) and move the other into `archive_dir`.
pub async fn select_canonical(
    kind: CaptureKind,
    first: &Path,
    second: &Path,
    archive_dir: &Path,
) -> Result<PairSelection, ReconcileError> {
    if files_match(first, second).await? {
        tracing::info!("{} copies are identical, dropping {:?}", kind.label(), second);
        tokio::fs::remove_file(second).await?;
        return Ok(PairSelection {
            kind,
            chosen: first.to_path_buf(),
            discarded: second.to_path_buf(),
            reason: SelectionReason::IdenticalContent,
            disposition: Disposition::Deleted,
        });
    }

    // Size is only a proxy for completeness; the chosen file is not validated
    let first_size = file_size(first).await;
    let second_size = file_size(second).await;
    let (chosen, discarded) = if second_size > first_size {
        (second, first)
    } else {
        (first, second)
    };
    tracing::warn!(
        "{} copies diverge ({} vs {} bytes), keeping {:?}",
        kind.label(),
        first_size,
        second_size,
        chosen
    );

    let disposition = if discarded.is_file() {
        Disposition::Archived(archive_file(discarded, archive_dir).await?)
    } else {
        Disposition::Missing
    };

    Ok(PairSelection {
        kind,
        chosen: chosen.to_path_buf(),
        discarded: discarded.to_path_buf(),
        reason: SelectionReason::LargerFile,
        disposition,
    })
}

fn with_suffix(stem: &OsStr, suffix: &str) -> OsString {
    let mut name = stem.to_os_string();
    name.push(suffix);
    name
}

/// Move a file into the archive directory, keeping its name
async fn archive_file(path: &Path, archive_dir: &Path) -> Result<PathBuf, ReconcileError> {
    tokio::fs::create_dir_all(archive_dir).await?;
    let file_name = path.file_name().ok_or_else(|| {
        ReconcileError::Integrity(format!("cannot archive {:?}: no file name", path))
    })?;
    let target = archive_dir.join(file_name);

    if tokio::fs::rename(path, &target).await.is_err() {
        // Archive may live on another filesystem
        tokio::fs::copy(path, &target).await?;
        tokio::fs::remove_file(path).await?;
    }

    tracing::info!("Archived divergent capture {:?} -> {:?}", path, target);
    Ok(target)
}

/// Read the artifact to EOF; zero bytes is an integrity failure
pub async fn verify_artifact(path: &Path) -> Result<u64, ReconcileError> {
    let bytes = read_fully(path)
        .await
        .map_err(|e| ReconcileError::Integrity(format!("cannot read {:?}: {}", path, e)))?;
    if bytes == 0 {
        return Err(ReconcileError::Integrity(format!("{:?} is empty", path)));
    }
    Ok(bytes)
}
