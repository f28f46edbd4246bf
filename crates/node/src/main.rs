//! DAQ Node - Main Entry Point

use daq_node::{init_logging, init_metrics, run, NodeConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = NodeConfig::load()?;
    init_logging(config.level()?)?;
    init_metrics(config.metrics_listen)?;

    info!("=== DAQ Node v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Sample rate {:?}, scan every {} ms, transmit every {} ms",
        config.acquisition.sample_rate,
        config.timing.thermocouple_period_ms,
        config.timing.transmit_period_ms
    );

    run(config).await?;

    Ok(())
}
