/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use easylap::config::ServiceConfig;
use easylap::discovery::LogAdvertiser;
use easylap::indicator::SimulatedIndicator;
use easylap::service::{transport_from_config, Service};

// ── CLI argument definition ───────────────────────────────────────────────────

/// EasyLap timing service.
///
/// Example:
///   easylapd -c /etc/easylap.yaml --device /dev/ttyUSB0 -p 5005
#[derive(Debug, Parser)]
#[command(
    name = "easylapd",
    about = "EasyLap service – lap-counter events over UDP",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML service configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// UDP port clients send HELLO/BYE/commands to (overrides the file).
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Local address to bind (overrides the file).
    #[arg(short = 'b', long = "bind")]
    bind: Option<IpAddr>,

    /// Sensor device node, e.g. /dev/ttyUSB0 (overrides the file).
    #[arg(long = "device", conflicts_with = "fake")]
    device: Option<PathBuf>,

    /// Use the fake sensor even if the file names a device.
    #[arg(long = "fake", default_value_t = false)]
    fake: bool,

    /// Show detailed info (debug level).
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,

    /// Run as daemon: plain log lines without colours, for the system journal.
    #[arg(short = 'd', long = "daemon", default_value_t = false)]
    daemon: bool,
}

impl Cli {
    /// File configuration (or defaults) with command-line overrides applied.
    fn service_config(&self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::load_from_file(path)?,
            None => ServiceConfig::default(),
        };
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(device) = &self.device {
            config.transport.device = Some(device.clone());
        }
        if self.fake {
            config.transport.device = None;
        }
        config.validate()?;
        Ok(config)
    }
}

// ── Signals ───────────────────────────────────────────────────────────────────

/// Resolves with the name of the first shutdown signal received.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::hangup()),
        ) {
            (Ok(mut term), Ok(mut hup)) => tokio::select! {
                _ = ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
                _ = hup.recv() => "SIGHUP",
            },
            (term, hup) => {
                if let Some(e) = term.err().or(hup.err()) {
                    warn!(error = %e, "Cannot install SIGTERM/SIGHUP handlers");
                }
                ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c().await;
        "Ctrl-C"
    }
}

async fn ctrl_c() {
    wait_for("Ctrl-C", tokio::signal::ctrl_c()).await;
}

/// Wait for a signal listener.  A listener that fails to install never
/// resolves, so the service keeps running instead of stopping at start-up.
async fn wait_for<F>(signal: &str, listener: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = listener.await {
        error!(signal, error = %e, "Cannot listen for signal");
        std::future::pending::<()>().await;
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=trace);
    // --verbose only changes the default.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_ansi(!cli.daemon)
        .init();

    info!("easylapd starting up...");

    let config = match cli.service_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            process::exit(1);
        }
    };

    info!(
        bind          = %config.bind_addr(),
        timeout_secs  = config.server.client_timeout_secs,
        service       = %config.service.name,
        device        = ?config.transport.device,
        "Configuration"
    );

    let indicator = Arc::new(Mutex::new(SimulatedIndicator::new()));
    let service = match Service::start(
        &config,
        indicator,
        transport_from_config(&config),
        Box::new(LogAdvertiser::new()),
    )
    .await
    {
        Ok(service) => service,
        Err(e) => {
            error!("{:#}, exiting", e);
            process::exit(1);
        }
    };

    let signal = shutdown_signal().await;
    info!(signal, "Received exit signal");
    service.shutdown().await;
}
