//! Service context
//!
//! Everything the scheduler and supervisors need, passed down explicitly.

use crate::config::{RecorderConfig, SettingsStore, SharedSettings};
use crate::external::{
    CaptureLauncher, EndpointResolver, FfmpegCapture, FfmpegTranscoder, LivenessProbe, Notifier,
    Transcoder, YtDlp,
};
use crate::scheduler::SchedulerConfig;
use std::sync::Arc;

/// Shared references to the recorder's collaborators
#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<dyn SettingsStore>,
    pub probe: Arc<dyn LivenessProbe>,
    pub resolver: Arc<dyn EndpointResolver>,
    pub launcher: Arc<dyn CaptureLauncher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub notifier: Arc<dyn Notifier>,
    pub scheduler: SchedulerConfig,
}

impl AppContext {
    /// Wire the context to yt-dlp and FFmpeg as configured
    pub fn with_system_tools(settings: Arc<SharedSettings>, notifier: Arc<dyn Notifier>) -> Self {
        let config: RecorderConfig = settings.snapshot();
        let ytdlp = Arc::new(YtDlp::new(
            config.tools.yt_dlp.clone(),
            config.source_url_template.clone(),
        ));

        Self {
            settings,
            probe: ytdlp.clone(),
            resolver: ytdlp,
            launcher: Arc::new(FfmpegCapture::new(
                config.tools.ffmpeg.clone(),
                config.audio_bitrate.clone(),
            )),
            transcoder: Arc::new(FfmpegTranscoder::new(config.tools.ffmpeg.clone())),
            notifier,
            scheduler: SchedulerConfig::from(&config),
        }
    }
}
