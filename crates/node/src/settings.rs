//! Node configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `DAQ_NODE__SECTION__KEY` environment variables.

use adc_controller::{BringUpTiming, FrontEndConfig, SampleRatePreset};
use serde::{Deserialize, Serialize};
use spi_bus::{BusError, SelectLine};
use std::collections::BTreeSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use stream_client::TcpConfig;
use thermocouple_scanner::THERMOCOUPLE_CHANNELS;
use thiserror::Error;
use tracing::Level;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "daq-node.toml";

/// Environment variable overriding the configuration file path
pub const CONFIG_PATH_ENV: &str = "DAQ_NODE_CONFIG";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "DAQ_NODE";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid select line: {0}")]
    Line(#[from] BusError),

    #[error("Select line {0} assigned to more than one device")]
    DuplicateLine(u8),

    #[error("Cannot resolve collector {0}")]
    Collector(String),

    #[error("Invalid log level: {0}")]
    LogLevel(String),

    #[error("{0} must be nonzero")]
    Zero(&'static str),
}

/// Collector endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub host: String,
    pub port: u16,
    /// Fixed local port for outbound connections
    pub local_port: Option<u16>,
    pub connect_timeout_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.5".to_string(),
            port: 8080,
            local_port: None,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Analog front-end settings shared by both devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub sample_rate: SampleRatePreset,
    /// Settle time after each select during bring-up
    pub select_settle_us: u64,
    /// Busy polls tolerated per bring-up transaction
    pub bring_up_max_polls: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRatePreset::default(),
            select_settle_us: 100,
            bring_up_max_polls: 100_000,
        }
    }
}

/// Bus-select line assignments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub thermocouple_lines: [u8; THERMOCOUPLE_CHANNELS],
    pub device_a_line: u8,
    pub device_b_line: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            thermocouple_lines: [0, 1, 2, 3],
            device_a_line: 4,
            device_b_line: 5,
        }
    }
}

/// Interrupt source periods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub thermocouple_period_ms: u64,
    pub transmit_period_ms: u64,
    pub data_ready_period_us: u64,
    /// Capture timer ticks per microsecond
    pub micros_per_tick: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            thermocouple_period_ms: 100,
            transmit_period_ms: 10,
            data_ready_period_us: 1_000,
            micros_per_tick: 100,
        }
    }
}

/// Hosted simulation knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Busy polls per simulated bus transaction
    pub transaction_polls: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            transaction_polls: 2,
        }
    }
}

/// Complete node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub log_level: String,
    /// Prometheus scrape endpoint; disabled when unset
    pub metrics_listen: Option<SocketAddr>,
    pub collector: CollectorConfig,
    pub acquisition: AcquisitionConfig,
    pub bus: BusConfig,
    pub timing: TimingConfig,
    pub simulation: SimulationConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_listen: None,
            collector: CollectorConfig::default(),
            acquisition: AcquisitionConfig::default(),
            bus: BusConfig::default(),
            timing: TimingConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Select lines after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMap {
    pub thermocouples: [SelectLine; THERMOCOUPLE_CHANNELS],
    pub device_a: SelectLine,
    pub device_b: SelectLine,
}

impl NodeConfig {
    /// Load from the file named by `DAQ_NODE_CONFIG` (or `daq-node.toml`)
    /// and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from `path` (optional) and the environment
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let node: NodeConfig = settings.try_deserialize()?;
        node.validate()?;
        Ok(node)
    }

    /// Parse from TOML text, without environment overrides
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        let node: NodeConfig = settings.try_deserialize()?;
        node.validate()?;
        Ok(node)
    }

    /// Check invariants the type system does not carry
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.level()?;
        self.lines()?;
        if self.timing.thermocouple_period_ms == 0 {
            return Err(ConfigError::Zero("timing.thermocouple_period_ms"));
        }
        if self.timing.transmit_period_ms == 0 {
            return Err(ConfigError::Zero("timing.transmit_period_ms"));
        }
        if self.timing.data_ready_period_us == 0 {
            return Err(ConfigError::Zero("timing.data_ready_period_us"));
        }
        if self.acquisition.bring_up_max_polls == 0 {
            return Err(ConfigError::Zero("acquisition.bring_up_max_polls"));
        }
        Ok(())
    }

    /// Log verbosity
    pub fn level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }

    /// Select lines, checked for range and pairwise distinctness
    pub fn lines(&self) -> Result<LineMap, ConfigError> {
        let mut seen = BTreeSet::new();
        let raw = self
            .bus
            .thermocouple_lines
            .iter()
            .chain([&self.bus.device_a_line, &self.bus.device_b_line]);
        for line in raw {
            if !seen.insert(*line) {
                return Err(ConfigError::DuplicateLine(*line));
            }
        }

        let [t0, t1, t2, t3] = self.bus.thermocouple_lines;
        Ok(LineMap {
            thermocouples: [
                SelectLine::new(t0)?,
                SelectLine::new(t1)?,
                SelectLine::new(t2)?,
                SelectLine::new(t3)?,
            ],
            device_a: SelectLine::new(self.bus.device_a_line)?,
            device_b: SelectLine::new(self.bus.device_b_line)?,
        })
    }

    /// Front-end settings for devices A and B
    pub fn front_ends(&self) -> Result<(FrontEndConfig, FrontEndConfig), ConfigError> {
        let lines = self.lines()?;
        let rate = self.acquisition.sample_rate;
        Ok((
            FrontEndConfig {
                line: lines.device_a,
                sample_rate: rate,
            },
            FrontEndConfig {
                line: lines.device_b,
                sample_rate: rate,
            },
        ))
    }

    pub fn bring_up_timing(&self) -> BringUpTiming {
        BringUpTiming {
            select_settle: Duration::from_micros(self.acquisition.select_settle_us),
            max_idle_polls: self.acquisition.bring_up_max_polls,
        }
    }

    /// Resolve the collector into transport settings
    pub fn tcp(&self) -> Result<TcpConfig, ConfigError> {
        let endpoint = format!("{}:{}", self.collector.host, self.collector.port);
        let collector = (self.collector.host.as_str(), self.collector.port)
            .to_socket_addrs()
            .map_err(|e| ConfigError::Collector(format!("{}: {}", endpoint, e)))?
            .next()
            .ok_or_else(|| ConfigError::Collector(endpoint.clone()))?;

        Ok(TcpConfig {
            collector,
            local_port: self.collector.local_port,
            connect_timeout: Duration::from_millis(self.collector.connect_timeout_ms),
        })
    }
}
