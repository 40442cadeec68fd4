//! yt-dlp based liveness probe and endpoint resolver

use super::{EndpointResolver, LivenessProbe};
use crate::config::settings::expand_source_url;
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::process::Command;

/// Liveness probe and endpoint resolver backed by yt-dlp
pub struct YtDlp {
    binary: String,
    url_template: String,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            url_template: url_template.into(),
        }
    }

    fn source_url(&self, source_id: &str) -> String {
        expand_source_url(&self.url_template, source_id)
    }
}

#[async_trait]
impl LivenessProbe for YtDlp {
    async fn is_live(&self, source_id: &str) -> io::Result<bool> {
        let url = self.source_url(source_id);

        // Exit code 0 means the page currently has a live title
        let status = Command::new(&self.binary)
            .args(["--quiet", "--no-warnings", "--print", "title", &url])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;

        Ok(status.success())
    }
}

#[async_trait]
impl EndpointResolver for YtDlp {
    async fn resolve(&self, source_id: &str) -> io::Result<Option<String>> {
        let url = self.source_url(source_id);

        let output = Command::new(&self.binary)
            .args(["--no-warnings", "--get-url", &url])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            tracing::warn!(
                "yt-dlp exited with {:?} resolving {}: {}",
                output.status.code(),
                source_id,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        Ok(first_endpoint_line(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// First non-empty line of resolver output
fn first_endpoint_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
