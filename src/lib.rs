//! Live Recorder - redundant capture of live network video sources.
//!
//! A scheduler polls the tracked sources, runs four redundant captures for
//! every source that goes live and reconciles them into one verified file.

pub mod config;
pub mod context;
pub mod external;
pub mod reconcile;
pub mod recorder;
pub mod scheduler;
pub mod utils;

#[cfg(test)]
mod testing;

use config::{RecorderConfig, SharedSettings};
use context::AppContext;
use external::BroadcastNotifier;
use scheduler::Scheduler;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::AppResult;

/// Install the global tracing subscriber
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_recorder=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the recorder until Ctrl-C
pub async fn run(config: RecorderConfig) -> AppResult<()> {
    config.validate()?;
    tracing::info!("Starting Live Recorder v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Download root {:?}, tracking {} source(s)",
        config.download_root,
        config.tracked_sources.len()
    );

    let settings = Arc::new(SharedSettings::new(config));
    let notifier = Arc::new(BroadcastNotifier::default());
    let ctx = Arc::new(AppContext::with_system_tools(settings, notifier));
    let scheduler = Arc::new(Scheduler::new(ctx));

    let poller = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received");

    if !scheduler.shutdown().await {
        tracing::warn!("Exiting with capture sessions still running");
    }
    if let Err(e) = poller.await {
        tracing::error!("Scheduler task failed: {}", e);
    }

    Ok(())
}
