//! Fake collaborators for unit tests

use crate::config::{RecorderConfig, SharedSettings};
use crate::context::AppContext;
use crate::external::{
    BroadcastNotifier, CaptureHandle, CaptureLauncher, EndpointResolver, LivenessProbe, Transcoder,
};
use crate::reconcile::types::{MuxStep, StepOutput};
use crate::recorder::state::{CaptureKind, CaptureSession, CaptureSlot, CaptureTask};
use crate::scheduler::SchedulerConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Write the four raw captures of a session
pub fn write_captures(session: &CaptureSession, v1: &[u8], v2: &[u8], a1: &[u8], a2: &[u8]) {
    std::fs::create_dir_all(&session.layout.work_dir).unwrap();
    for (kind, slot, bytes) in [
        (CaptureKind::Video, CaptureSlot::One, v1),
        (CaptureKind::Video, CaptureSlot::Two, v2),
        (CaptureKind::Audio, CaptureSlot::One, a1),
        (CaptureKind::Audio, CaptureSlot::Two, a2),
    ] {
        let task = session.task(kind, slot).unwrap();
        std::fs::write(&task.output_path, bytes).unwrap();
    }
}

/// Transcoder that concatenates its inputs into the output
#[derive(Default)]
pub struct FakeTranscoder {
    steps: Mutex<Vec<MuxStep>>,
    fail_at: Option<MuxStep>,
    panic_at: Option<MuxStep>,
}

impl FakeTranscoder {
    pub fn failing_at(step: MuxStep) -> Self {
        Self {
            fail_at: Some(step),
            ..Default::default()
        }
    }

    pub fn panicking_at(step: MuxStep) -> Self {
        Self {
            panic_at: Some(step),
            ..Default::default()
        }
    }

    pub fn steps(&self) -> Vec<MuxStep> {
        self.steps.lock().clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn run(&self, step: MuxStep, inputs: &[PathBuf], output: &Path) -> io::Result<StepOutput> {
        self.steps.lock().push(step);
        if self.panic_at == Some(step) {
            panic!("transcoder crashed during {}", step);
        }
        if self.fail_at == Some(step) {
            return Ok(StepOutput {
                success: false,
                exit_code: Some(1),
                diagnostic: "simulated failure".to_string(),
            });
        }

        let mut bytes = Vec::new();
        for input in inputs {
            bytes.extend(std::fs::read(input)?);
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, bytes)?;
        Ok(StepOutput {
            success: true,
            exit_code: Some(0),
            diagnostic: String::new(),
        })
    }
}

/// How a scripted probe answers for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAnswer {
    Live,
    NotLive,
    Hang,
    Fail,
}

/// Probe answering from a script; unknown sources are not live
#[derive(Default)]
pub struct ScriptedProbe {
    answers: Mutex<HashMap<String, ProbeAnswer>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedProbe {
    pub fn set(&self, source: &str, answer: ProbeAnswer) {
        self.answers.lock().insert(source.to_string(), answer);
    }

    pub fn calls(&self, source: &str) -> usize {
        self.calls.lock().get(source).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LivenessProbe for ScriptedProbe {
    async fn is_live(&self, source_id: &str) -> io::Result<bool> {
        *self.calls.lock().entry(source_id.to_string()).or_insert(0) += 1;
        let answer = self
            .answers
            .lock()
            .get(source_id)
            .copied()
            .unwrap_or(ProbeAnswer::NotLive);
        match answer {
            ProbeAnswer::Live => Ok(true),
            ProbeAnswer::NotLive => Ok(false),
            ProbeAnswer::Fail => Err(io::Error::new(io::ErrorKind::NotFound, "probe missing")),
            ProbeAnswer::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(true)
            }
        }
    }
}

/// Resolver returning a fixed answer
pub struct FixedResolver {
    endpoint: Option<String>,
    calls: AtomicUsize,
}

impl FixedResolver {
    pub fn new(endpoint: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.map(str::to_string),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointResolver for FixedResolver {
    async fn resolve(&self, _source_id: &str) -> io::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.endpoint.clone())
    }
}

/// Launcher writing synthetic captures.
///
/// Handles stay running until `release()` is called (or they are killed),
/// except those set up with `exits_early`.
pub struct FakeLauncher {
    launched: Mutex<Vec<PathBuf>>,
    gate: CancellationToken,
    fail_on: Option<usize>,
    exit_codes: HashMap<usize, i32>,
    early_exits: HashMap<usize, i32>,
    payloads: HashMap<usize, Vec<u8>>,
    kills: Arc<AtomicUsize>,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            gate: CancellationToken::new(),
            fail_on: None,
            exit_codes: HashMap::new(),
            early_exits: HashMap::new(),
            payloads: HashMap::new(),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FakeLauncher {
    /// Handles exit as soon as they are waited on
    pub fn immediate() -> Self {
        let launcher = Self::default();
        launcher.release();
        launcher
    }

    /// The n-th launch (0-based) fails to spawn
    pub fn failing_on(mut self, index: usize) -> Self {
        self.fail_on = Some(index);
        self
    }

    /// The n-th task exits with `code`
    pub fn exit_code(mut self, index: usize, code: i32) -> Self {
        self.exit_codes.insert(index, code);
        self
    }

    /// The n-th task exits with `code` as soon as it is waited on,
    /// without waiting for `release()`
    pub fn exits_early(mut self, index: usize, code: i32) -> Self {
        self.early_exits.insert(index, code);
        self
    }

    /// The n-th task writes `bytes` instead of the default payload
    pub fn payload(mut self, index: usize, bytes: &[u8]) -> Self {
        self.payloads.insert(index, bytes.to_vec());
        self
    }

    pub fn release(&self) {
        self.gate.cancel();
    }

    pub fn launched(&self) -> Vec<PathBuf> {
        self.launched.lock().clone()
    }

    /// Number of kill requests sent to launched tasks
    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl CaptureLauncher for FakeLauncher {
    fn launch(&self, _endpoint: &str, task: &CaptureTask) -> io::Result<Box<dyn CaptureHandle>> {
        let index = self.launched.lock().len();
        if self.fail_on == Some(index) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "ffmpeg not found"));
        }
        self.launched.lock().push(task.output_path.clone());

        let default_payload = format!("{}-stream-data", task.kind.label()).into_bytes();
        let bytes = self.payloads.get(&index).cloned().unwrap_or(default_payload);
        std::fs::write(&task.output_path, bytes)?;

        Ok(Box::new(FakeHandle {
            gate: self.gate.clone(),
            killed: CancellationToken::new(),
            exit_code: self.exit_codes.get(&index).copied().unwrap_or(0),
            early_exit: self.early_exits.get(&index).copied(),
            kills: Arc::clone(&self.kills),
        }))
    }
}

struct FakeHandle {
    gate: CancellationToken,
    killed: CancellationToken,
    exit_code: i32,
    early_exit: Option<i32>,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl CaptureHandle for FakeHandle {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        if let Some(code) = self.early_exit {
            return Ok(Some(code));
        }
        tokio::select! {
            _ = self.gate.cancelled() => Ok(Some(self.exit_code)),
            _ = self.killed.cancelled() => Ok(None),
        }
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.killed.cancel();
        Ok(())
    }
}

/// Collaborators of a test context, kept for assertions
pub struct Fakes {
    pub settings: Arc<SharedSettings>,
    pub probe: Arc<ScriptedProbe>,
    pub resolver: Arc<FixedResolver>,
    pub launcher: Arc<FakeLauncher>,
    pub transcoder: Arc<FakeTranscoder>,
    pub notifier: Arc<BroadcastNotifier>,
}

impl Fakes {
    pub fn new(root: &Path, sources: &[&str]) -> Self {
        let config = RecorderConfig {
            download_root: root.to_path_buf(),
            tracked_sources: sources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        Self {
            settings: Arc::new(SharedSettings::new(config)),
            probe: Arc::new(ScriptedProbe::default()),
            resolver: Arc::new(FixedResolver::new(Some("https://edge.example/live.m3u8"))),
            launcher: Arc::new(FakeLauncher::immediate()),
            transcoder: Arc::new(FakeTranscoder::default()),
            notifier: Arc::new(BroadcastNotifier::default()),
        }
    }

    pub fn context(&self) -> AppContext {
        AppContext {
            settings: self.settings.clone(),
            probe: self.probe.clone(),
            resolver: self.resolver.clone(),
            launcher: self.launcher.clone(),
            transcoder: self.transcoder.clone(),
            notifier: self.notifier.clone(),
            scheduler: SchedulerConfig {
                poll_interval: Duration::from_secs(60),
                probe_timeout: Duration::from_secs(30),
                startup_delay: Duration::ZERO,
                shutdown_timeout: Duration::from_secs(5),
            },
        }
    }
}
