use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use stockwatch::config::AppConfig;
use stockwatch::logging::{LogFiles, init_logging};
use stockwatch::{panic_hook, services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    let log_files = LogFiles::new(&config.log_dir, "stockwatch");
    let _log_guard = init_logging(&log_files)?;
    panic_hook::install(log_files.clone());

    for warning in config.warnings() {
        warn!("{}", warning);
    }

    let cancel = CancellationToken::new();
    log_files.start_retention_cleanup(cancel.child_token());

    let mut poller = match services::build_poller(&config).await {
        Ok(poller) => poller,
        Err(e) => {
            error!(error = %e, "Failed to start poller");
            return Err(e.into());
        }
    };

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, finishing current cycle");
            shutdown.cancel();
        }
    });

    info!(
        timezone = config.timezone_name(),
        poll_secs = config.poll_interval.as_secs(),
        "stockwatch started"
    );
    poller.run(cancel).await;
    Ok(())
}
