//! `thresher run`: start the bot.

use std::path::Path;

use tracing::{error, info};

use crate::app::{Config, Orchestrator};
use crate::error::Result;

/// Load config, build the orchestrator, and run until shutdown.
///
/// Returns the process exit code: 0 on clean shutdown, non-zero on
/// initialization failure.
pub async fn execute(config_path: &Path) -> i32 {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return 1;
        }
    };
    config.init_logging();

    info!(config = %config_path.display(), "thresher starting");

    match start(config).await {
        Ok(()) => {
            info!("thresher stopped");
            0
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            1
        }
    }
}

async fn start(config: Config) -> Result<()> {
    let orchestrator = Orchestrator::build(config).await?;
    orchestrator.run().await
}
