use anyhow::Result;
use sunward::supervisor::ChargeSupervisor;
use sunward::{Config, logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Optional config path as the sole argument; default search paths otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Sunward v{} starting up", env!("CARGO_PKG_VERSION"));

    // Startup probe of both collaborators is fatal on failure
    let mut supervisor = ChargeSupervisor::new(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start supervisor: {}", e))?;

    // A termination signal ends the loop between cycles
    let shutdown = supervisor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(());
        }
    });

    match supervisor.run().await {
        Ok(()) => {
            info!("Supervisor shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Supervisor failed with error: {}", e);
            Err(anyhow::anyhow!("Supervisor error: {}", e))
        }
    }
}
