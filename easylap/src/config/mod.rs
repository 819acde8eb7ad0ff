//! Service configuration loading.
//!
//! Every field has a default, so the service runs without a file and a file
//! only needs the values it changes.  The expected YAML structure is:
//! ```yaml
//! server:
//!   bind: "0.0.0.0"
//!   port: 5005
//!   client_timeout_secs: 15
//! service:
//!   name: "EasyLap Service"
//!   type: "_easylap._udp.local."
//!   version: "0.0.1"
//! transport:
//!   device: "/dev/ttyUSB0"     # omit to run against the fake sensor
//!   baud_rate: 38400
//!   retry_delay_ms: 1000
//!   read_chunk: 64
//!   fake_interval_ms: 1000
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::discovery::{DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_TYPE, DEFAULT_SERVICE_VERSION};
use crate::ingest::{IngestOptions, DEFAULT_READ_CHUNK, DEFAULT_RETRY_DELAY, SENSOR_BAUD_RATE};
use crate::registry::CLIENT_TIMEOUT_SECS;

/// Default UDP port of the fan-out endpoint.
pub const DEFAULT_PORT: u16 = 5005;

// ── Sections ──────────────────────────────────────────────────────────────────

/// Datagram endpoint and membership settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Seconds without a `HELLO` before a client is dropped.
    pub client_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            client_timeout_secs: CLIENT_TIMEOUT_SECS,
        }
    }
}

/// What the service advertises on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdvertConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub version: String,
}

impl Default for AdvertConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_string(),
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            version: DEFAULT_SERVICE_VERSION.to_string(),
        }
    }
}

/// Sensor link settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Device node of the sensor.  `None` selects the fake sensor.
    pub device: Option<PathBuf>,
    /// Line speed of the sensor UART (always 8N1, no flow control).
    pub baud_rate: u32,
    pub retry_delay_ms: u64,
    pub read_chunk: usize,
    /// Chunk interval of the fake sensor.
    pub fake_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device: None,
            baud_rate: SENSOR_BAUD_RATE,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            read_chunk: DEFAULT_READ_CHUNK,
            fake_interval_ms: 1000,
        }
    }
}

// ── ServiceConfig ─────────────────────────────────────────────────────────────

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub service: AdvertConfig,
    pub transport: TransportConfig,
}

impl ServiceConfig {
    /// Parse and validate `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is malformed or
    /// has unknown keys, or a value fails [`validate`](Self::validate).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading service configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        // An empty file is a valid "all defaults" configuration.
        let config: ServiceConfig = if content.trim().is_empty() {
            ServiceConfig::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.server.port != 0, "server.port must not be 0");
        ensure!(
            self.server.client_timeout_secs > 0,
            "server.client_timeout_secs must be positive"
        );
        ensure!(self.transport.read_chunk > 0, "transport.read_chunk must be positive");
        ensure!(self.transport.baud_rate > 0, "transport.baud_rate must be positive");
        ensure!(
            !self.service.name.trim().is_empty(),
            "service.name must not be empty"
        );
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            retry_delay: Duration::from_millis(self.transport.retry_delay_ms),
            read_chunk: self.transport.read_chunk,
        }
    }

    pub fn fake_interval(&self) -> Duration {
        Duration::from_millis(self.transport.fake_interval_ms)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
