//! FFmpeg capture and mux invocations
//!
//! Capture branches are long-running children the supervisor waits on;
//! mux steps are short blocking runs whose stderr is kept as diagnostics.

use super::{CaptureHandle, CaptureLauncher, Transcoder};
use crate::reconcile::types::{MuxStep, StepOutput};
use crate::recorder::state::CaptureTask;
use crate::recorder::strategy::{CaptureArgs, CaptureStrategy};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Longest stderr tail kept from a failed mux step
const MAX_DIAGNOSTIC_CHARS: usize = 4000;

const COMMON_ARGS: &[&str] = &["-hide_banner", "-loglevel", "warning", "-y"];

/// Launches capture branches as FFmpeg children
pub struct FfmpegCapture {
    binary: String,
    audio_bitrate: String,
}

impl FfmpegCapture {
    pub fn new(binary: impl Into<String>, audio_bitrate: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            audio_bitrate: audio_bitrate.into(),
        }
    }
}

impl CaptureLauncher for FfmpegCapture {
    fn launch(&self, endpoint: &str, task: &CaptureTask) -> io::Result<Box<dyn CaptureHandle>> {
        let strategy = CaptureStrategy::for_kind(task.kind);
        let args = strategy.build_args(&CaptureArgs {
            endpoint,
            output: &task.output_path,
            audio_bitrate: &self.audio_bitrate,
        });

        tracing::debug!("Launching {} capture: {} {:?}", task.name(), self.binary, args);

        // stderr is inherited: a piped stream nobody drains would stall the child
        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        Ok(Box::new(FfmpegHandle { child }))
    }
}

struct FfmpegHandle {
    child: Child,
}

#[async_trait]
impl CaptureHandle for FfmpegHandle {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }
}

/// Runs mux steps through FFmpeg
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(&self, step: MuxStep, inputs: &[PathBuf], output: &Path) -> io::Result<StepOutput> {
        let args = mux_args(step, inputs, output)?;
        tracing::info!("Running {}: {} {:?}", step, self.binary, args);

        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(StepOutput {
            success: result.status.success(),
            exit_code: result.status.code(),
            diagnostic: diagnostic_tail(&String::from_utf8_lossy(&result.stderr)),
        })
    }
}

/// Build the FFmpeg arguments for one mux step
pub fn mux_args(step: MuxStep, inputs: &[PathBuf], output: &Path) -> io::Result<Vec<OsString>> {
    if inputs.len() != step.input_count() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} expects {} input(s), got {}",
                step,
                step.input_count(),
                inputs.len()
            ),
        ));
    }

    let mut args: Vec<OsString> = COMMON_ARGS.iter().map(OsString::from).collect();
    for input in inputs {
        args.push("-i".into());
        args.push(input.as_os_str().to_os_string());
    }

    let codec_args: &[&str] = match step {
        MuxStep::AudioTranscode => &["-codec:a", "libmp3lame", "-qscale:a", "2"],
        MuxStep::VideoStrip => &["-c:v", "copy", "-an"],
        MuxStep::FinalMux => &[
            "-c:v", "copy", "-c:a", "aac", "-map", "0:v:0", "-map", "1:a:0",
        ],
    };
    args.extend(codec_args.iter().map(OsString::from));
    args.push(output.as_os_str().to_os_string());

    Ok(args)
}

fn diagnostic_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= MAX_DIAGNOSTIC_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - MAX_DIAGNOSTIC_CHARS).collect()
}
