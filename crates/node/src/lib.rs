//! DAQ Node Runtime
//!
//! Wires the acquisition core into a running node:
//! - Configuration layering and validation
//! - The main-loop context with its fixed-priority handler table
//! - Simulated interrupt sources on the tokio runtime
//! - Logging and metrics setup for the `daq-node` binary

mod interrupts;
mod node;
mod settings;

pub use interrupts::{CaptureTimer, InterruptPlan, Interrupts, TICK_PERIOD};
pub use node::{Handled, Handler, Iteration, Node, NodeStats, PRIORITY};
pub use settings::{
    AcquisitionConfig, BusConfig, CollectorConfig, ConfigError, LineMap, NodeConfig,
    SimulationConfig, TimingConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE, ENV_PREFIX,
};

use adc_controller::AcquisitionController;
use event_signals::SignalSet;
use metrics_exporter_prometheus::PrometheusBuilder;
use spi_bus::{SimulatedBus, StdDelay};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stream_client::{StreamingClient, TcpTransport};
use thermocouple_scanner::ThermocoupleScanner;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Interval between status lines from the main loop
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Initialize logging
pub fn init_logging(level: Level) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Install the Prometheus exporter when an endpoint is configured
pub fn init_metrics(
    listen: Option<SocketAddr>,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    if let Some(addr) = listen {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }
    Ok(())
}

/// Build the main-loop context from configuration
pub fn build_node(config: &NodeConfig) -> Result<Node, ConfigError> {
    let lines = config.lines()?;
    let (a, b) = config.front_ends()?;
    Ok(Node::new(
        ThermocoupleScanner::new(lines.thermocouples),
        AcquisitionController::new(a, b, config.bring_up_timing()),
        StreamingClient::new(),
    ))
}

/// Bring the node up on the simulated bus and run the main loop until Ctrl-C
pub async fn run(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut node = build_node(&config)?;
    let mut bus = SimulatedBus::new(config.simulation.transaction_polls);
    node.bring_up(&mut bus, &mut StdDelay)?;

    let mut transport = TcpTransport::new(config.tcp()?)?;
    info!("Streaming to collector {}", transport.config().collector);

    let signals = Arc::new(SignalSet::new());
    let interrupts = Interrupts::spawn(Arc::clone(&signals), &InterruptPlan::from(&config.timing));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                running.store(false, Ordering::Relaxed);
            }
        });
    }

    node.start(&mut transport);
    let mut last_status = Instant::now();
    while running.load(Ordering::Relaxed) {
        node.poll_once(&signals, &mut bus, &mut transport);

        if last_status.elapsed() >= STATUS_INTERVAL {
            let stats = node.stats();
            info!(
                "Status: {} iterations, {} frames sent, {} deferred, {} bus errors, connection {}",
                stats.iterations,
                stats.frames_sent,
                stats.deferred,
                stats.bus_errors,
                node.connection_state()
            );
            last_status = Instant::now();
        }

        tokio::task::yield_now().await;
    }

    info!("Shutting down");
    interrupts.shutdown();
    Ok(())
}
