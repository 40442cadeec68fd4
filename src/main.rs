use anyhow::Context;
use live_recorder::config::RecorderConfig;
use std::path::PathBuf;

const CONFIG_ENV: &str = "LIVE_RECORDER_CONFIG";
const DEFAULT_CONFIG: &str = "settings.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    live_recorder::init_logging();

    let path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = RecorderConfig::load(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;

    live_recorder::run(config).await?;
    Ok(())
}
