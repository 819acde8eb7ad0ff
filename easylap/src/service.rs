/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Service lifecycle: wires the fan-out server, the ingestion loop, the
//! indicator and the advertisement together.
//!
//! ```text
//! start:    lights ON → bind → advertise → spawn server + ingestion
//!           → (1 s later) waiting pattern
//! shutdown: cancel → join tasks → deregister → lights OFF
//! ```
//!
//! The indicator is switched off on every exit path, including a failed
//! bind.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::CommandDispatcher;
use crate::config::ServiceConfig;
use crate::discovery::{local_ipv4, ServiceAdvertiser, ServiceInfo};
use crate::indicator::{Indicator, SharedIndicator, WAITING_PATTERN};
use crate::ingest::{run_ingestion, DeviceTransport, FakeTransport, Transport};
use crate::server::FanoutServer;

/// Capacity of the decoder → server event queue.
const EVENT_QUEUE: usize = 64;

/// Delay between start-up (all lights on) and the waiting pattern.
const WAITING_DELAY: Duration = Duration::from_secs(1);

/// Pick the sensor transport named by the configuration.
pub fn transport_from_config(config: &ServiceConfig) -> Box<dyn Transport> {
    match &config.transport.device {
        Some(path) => Box::new(DeviceTransport::new(path, config.transport.baud_rate)),
        None => {
            warn!("No sensor device configured, using the fake sensor");
            Box::new(FakeTransport::new(config.fake_interval()))
        }
    }
}

/// A running service.  Call [`shutdown`](Self::shutdown) to stop it.
pub struct Service<I: Indicator + 'static> {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    server_task: JoinHandle<()>,
    ingest_task: JoinHandle<()>,
    waiting_task: JoinHandle<()>,
    advertiser: Box<dyn ServiceAdvertiser>,
    indicator: SharedIndicator<I>,
}

impl<I: Indicator + 'static> Service<I> {
    /// Bring the service up.
    ///
    /// # Errors
    /// Fails only if the datagram endpoint cannot be bound.  The indicator is
    /// already switched off when the error is returned.
    pub async fn start(
        config: &ServiceConfig,
        indicator: SharedIndicator<I>,
        transport: Box<dyn Transport>,
        mut advertiser: Box<dyn ServiceAdvertiser>,
    ) -> Result<Self> {
        let mut lights = indicator.clone();
        if let Err(e) = lights.on() {
            warn!(error = %e, "Cannot switch indicator on");
        }

        let server = match FanoutServer::bind_with_timeout(
            config.bind_addr(),
            config.server.client_timeout_secs,
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                switch_off(&mut lights);
                return Err(e).context("Could not create endpoint");
            }
        };
        let local_addr = match server.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                switch_off(&mut lights);
                return Err(e.into());
            }
        };

        let info = ServiceInfo::new(
            &config.service.name,
            &config.service.service_type,
            &config.service.version,
            local_ipv4(),
            local_addr.port(),
        );
        if let Err(e) = advertiser.register(&info).await {
            warn!(error = %e, "Service advertisement failed, clients need the address");
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);

        let dispatcher = CommandDispatcher::new(indicator.clone());
        let server_task = tokio::spawn(server.run(rx, dispatcher, cancel.clone()));

        let options = config.ingest_options();
        let ingest_cancel = cancel.clone();
        let ingest_task = tokio::spawn(async move {
            run_ingestion(transport.as_ref(), tx, options, ingest_cancel).await;
        });

        let waiting_cancel = cancel.clone();
        let waiting_task = tokio::spawn(async move {
            tokio::select! {
                _ = waiting_cancel.cancelled() => {}
                _ = tokio::time::sleep(WAITING_DELAY) => {
                    if let Err(e) = lights.apply(WAITING_PATTERN) {
                        warn!(error = %e, "Cannot show waiting pattern");
                    }
                }
            }
        });

        info!(%local_addr, "Service started");
        Ok(Self {
            local_addr,
            cancel,
            server_task,
            ingest_task,
            waiting_task,
            advertiser,
            indicator,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop every task, withdraw the advertisement and switch the lights off.
    pub async fn shutdown(mut self) {
        info!("Shutting down...");
        self.cancel.cancel();
        for (name, task) in [
            ("ingestion", self.ingest_task),
            ("fan-out server", self.server_task),
            ("indicator", self.waiting_task),
        ] {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "Task ended abnormally");
            }
        }
        self.advertiser.deregister().await;
        switch_off(&mut self.indicator);
        info!("Done");
    }
}

fn switch_off<I: Indicator>(indicator: &mut I) {
    if let Err(e) = indicator.off() {
        warn!(error = %e, "Cannot switch indicator off");
    }
}
