use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stockwatch::config::AppConfig;
use stockwatch::logging::{LogFiles, init_logging};
use stockwatch::{panic_hook, services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    let log_files = LogFiles::new(&config.log_dir, "stockwatch-watchdog");
    let _log_guard = init_logging(&log_files)?;
    panic_hook::install(log_files.clone());

    for warning in config.warnings() {
        warn!("{}", warning);
    }

    let cancel = CancellationToken::new();
    log_files.start_retention_cleanup(cancel.child_token());

    let watchdog = services::build_watchdog(&config)
        .await
        .context("failed to start watchdog")?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    watchdog.run(cancel).await;
    Ok(())
}
