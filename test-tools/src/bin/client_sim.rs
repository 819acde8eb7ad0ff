/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! client-sim – simulates a lap-timing display client.
//!
//! Registers with `HELLO` every 10 s (well inside the server's 15 s timeout),
//! logs every event it receives and, with `--lights`, walks the indicator
//! bar with one `LIGHTS <n>` command per second.  Sends `BYE` on Ctrl-C.
//!
//! ```text
//! client-sim --server 192.168.1.10:5005 --lights
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use easylap::event::{TimingEvent, WireEvent};
use easylap::server::{BYE, HELLO};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const LIGHTS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "client-sim", about = "Simulated EasyLap display client")]
struct Cli {
    /// Address of the running easylapd.
    #[arg(short = 's', long = "server", default_value = "127.0.0.1:5005")]
    server: SocketAddr,

    /// Local address to receive broadcasts on.
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0:5006")]
    bind: SocketAddr,

    /// Also send a LIGHTS command every second.
    #[arg(short = 'l', long = "lights", default_value_t = false)]
    lights: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let socket = UdpSocket::bind(cli.bind)
        .await
        .with_context(|| format!("Cannot bind {}", cli.bind))?;
    info!(local = %socket.local_addr()?, server = %cli.server, "Client starting...");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut lights_tick = tokio::time::interval(LIGHTS_INTERVAL);
    let mut count: u16 = 0;
    let mut buf = [0u8; 512];

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = heartbeat.tick() => {
                socket.send_to(HELLO.as_bytes(), cli.server).await.context("HELLO failed")?;
            }
            _ = lights_tick.tick(), if cli.lights => {
                let command = format!("LIGHTS {}", count << 2);
                info!(%command, "Sending");
                socket.send_to(command.as_bytes(), cli.server).await.context("command failed")?;
                count = (count + 1) % (1 << 7);
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => match WireEvent::from_bytes(&buf[..n]).map(TimingEvent::from) {
                    Ok(event) if event.is_timer() => info!(time = event.timestamp_ticks, "Timer"),
                    Ok(event) => info!(time = event.timestamp_ticks, car = event.car_id, "Car"),
                    Err(e) => warn!(%from, error = %e, "Unexpected datagram"),
                },
                Err(e) => warn!(error = %e, "Receive error"),
            },
        }
    }

    socket.send_to(BYE.as_bytes(), cli.server).await.context("BYE failed")?;
    info!("Sent BYE, exiting");
    Ok(())
}
