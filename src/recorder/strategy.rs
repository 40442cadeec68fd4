//! Capture strategies
//!
//! Each capture branch runs one strategy. A strategy maps to a single
//! argument builder for the transcoder; there are no other variants.

use super::state::CaptureKind;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;

/// Flags for a long-running capture of a possibly unstable network source
const RESILIENCE_ARGS: &[&str] = &[
    "-hide_banner",
    "-loglevel",
    "warning",
    "-y",
    "-reconnect",
    "1",
    "-reconnect_streamed",
    "1",
    "-reconnect_at_eof",
    "1",
    "-reconnect_on_network_error",
    "1",
    "-reconnect_delay_max",
    "10",
];

/// Inputs shared by every strategy
#[derive(Debug, Clone, Copy)]
pub struct CaptureArgs<'a> {
    pub endpoint: &'a str,
    pub output: &'a Path,
    pub audio_bitrate: &'a str,
}

type ArgBuilder = fn(&CaptureArgs<'_>) -> Vec<OsString>;

/// How a capture branch records the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStrategy {
    /// Stream copy of all tracks into MPEG-TS
    VideoCopy,
    /// Audio only, re-encoded to AAC in ADTS
    AudioAac,
}

impl CaptureStrategy {
    pub fn for_kind(kind: CaptureKind) -> Self {
        match kind {
            CaptureKind::Video => CaptureStrategy::VideoCopy,
            CaptureKind::Audio => CaptureStrategy::AudioAac,
        }
    }

    fn builder(self) -> ArgBuilder {
        match self {
            CaptureStrategy::VideoCopy => video_copy_args,
            CaptureStrategy::AudioAac => audio_aac_args,
        }
    }

    /// Full transcoder argument list for this strategy.
    ///
    /// The output path is passed through unchanged, even if it is not UTF-8.
    pub fn build_args(self, args: &CaptureArgs<'_>) -> Vec<OsString> {
        (self.builder())(args)
    }
}

fn input_args(endpoint: &str) -> Vec<OsString> {
    let mut out: Vec<OsString> = RESILIENCE_ARGS.iter().map(OsString::from).collect();
    out.push("-i".into());
    out.push(endpoint.into());
    out
}

fn video_copy_args(args: &CaptureArgs<'_>) -> Vec<OsString> {
    let mut out = input_args(args.endpoint);
    out.extend(["-c", "copy", "-f", "mpegts"].map(OsString::from));
    out.push(args.output.as_os_str().to_os_string());
    out
}

fn audio_aac_args(args: &CaptureArgs<'_>) -> Vec<OsString> {
    let mut out = input_args(args.endpoint);
    out.extend(["-vn", "-c:a", "aac", "-b:a"].map(OsString::from));
    out.push(args.audio_bitrate.into());
    out.extend(["-f", "adts"].map(OsString::from));
    out.push(args.output.as_os_str().to_os_string());
    out
}
