/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! UDP fan-out server.
//!
//! [`FanoutServer`] owns the single datagram endpoint and the
//! [`ClientRegistry`].  Its [`run`](FanoutServer::run) loop is one task with
//! three transitions:
//!
//! | Transition | Trigger | Action |
//! |---|---|---|
//! | inbound | datagram from a client | `HELLO` → touch, `BYE` → remove, else command; then purge |
//! | broadcast | event from the ingestion loop | send to every registered client; then purge |
//! | receive error | `recv_from` fails | log, keep serving |
//!
//! Both registry mutations and socket sends happen on this one task, so the
//! registry needs no lock.  The endpoint is closed when the server is dropped
//! at the end of `run`.

pub mod error;

pub use error::ServerError;

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::CommandHandler;
use crate::event::TimingEvent;
use crate::registry::{now_epoch_secs, ClientRegistry, CLIENT_TIMEOUT_SECS};

// ── Protocol literals ─────────────────────────────────────────────────────────

/// Heartbeat: register or refresh the sender.
pub const HELLO: &str = "HELLO";

/// Leave: unregister the sender immediately.
pub const BYE: &str = "BYE";

/// Largest inbound datagram read in one go; longer ones are truncated.
pub const MAX_DATAGRAM: usize = 2048;

/// Classification of one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    Hello,
    Bye,
    Command(&'a str),
    /// Not valid UTF-8.
    Invalid,
}

impl<'a> Inbound<'a> {
    pub fn classify(data: &'a [u8]) -> Self {
        match std::str::from_utf8(data) {
            Ok(HELLO) => Inbound::Hello,
            Ok(BYE) => Inbound::Bye,
            Ok(text) => Inbound::Command(text),
            Err(_) => Inbound::Invalid,
        }
    }
}

// ── FanoutServer ──────────────────────────────────────────────────────────────

pub struct FanoutServer {
    socket: UdpSocket,
    registry: ClientRegistry,
    timeout_secs: u64,
}

impl FanoutServer {
    /// Bind the datagram endpoint with the default client timeout.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        Self::bind_with_timeout(addr, CLIENT_TIMEOUT_SECS).await
    }

    /// Bind the datagram endpoint.
    ///
    /// # Errors
    /// [`ServerError::Bind`] if the address/port is unavailable.  There is no
    /// retry; the caller is expected to exit.
    pub async fn bind_with_timeout(
        addr: SocketAddr,
        timeout_secs: u64,
    ) -> Result<Self, ServerError> {
        info!(%addr, "Creating endpoint");
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        debug!("Endpoint created");
        Ok(Self {
            socket,
            registry: ClientRegistry::new(),
            timeout_secs,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.socket.local_addr().map_err(ServerError::LocalAddr)
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    pub fn on_inbound_datagram(
        &mut self,
        data: &[u8],
        from: SocketAddr,
        handler: &mut dyn CommandHandler,
    ) {
        self.on_inbound_datagram_at(data, from, now_epoch_secs(), handler);
    }

    /// Handle one datagram as of `now` (epoch seconds).
    ///
    /// Command failures are logged and swallowed.
    pub fn on_inbound_datagram_at(
        &mut self,
        data: &[u8],
        from: SocketAddr,
        now: u64,
        handler: &mut dyn CommandHandler,
    ) {
        match Inbound::classify(data) {
            Inbound::Hello => {
                self.registry.touch(from, now);
            }
            Inbound::Bye => {
                self.registry.remove(&from);
            }
            Inbound::Command(text) => {
                debug!(client = %from, command = %text, "Received command");
                if let Err(e) = handler.handle(text) {
                    warn!(client = %from, command = %text, error = %e, "Cannot handle command");
                }
            }
            Inbound::Invalid => {
                warn!(client = %from, len = data.len(), "Ignoring non-text datagram");
            }
        }
        self.registry.purge(now, self.timeout_secs);
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Send `payload` to every registered client and return how many sends
    /// succeeded.
    pub async fn broadcast(&mut self, payload: &[u8]) -> usize {
        self.broadcast_at(payload, now_epoch_secs()).await
    }

    /// [`broadcast`](Self::broadcast) as of `now`.  Clients expiring at `now`
    /// still get this payload; they are purged afterwards.
    pub async fn broadcast_at(&mut self, payload: &[u8], now: u64) -> usize {
        let clients = self.registry.snapshot();
        let mut sent = 0usize;
        for client in &clients {
            match self.socket.send_to(payload, client).await {
                Ok(_) => sent += 1,
                Err(e) => warn!(%client, error = %e, "Send failed"),
            }
        }
        debug!(clients = clients.len(), sent, "broadcast");
        self.registry.purge(now, self.timeout_secs);
        sent
    }

    // ── Event loop ────────────────────────────────────────────────────────────

    /// Serve until `cancel` fires or the event channel closes.
    ///
    /// Events are broadcast in the order they are received from `events`.
    pub async fn run<H: CommandHandler>(
        mut self,
        mut events: mpsc::Receiver<TimingEvent>,
        mut handler: H,
        cancel: CancellationToken,
    ) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        info!(
            addr = ?self.socket.local_addr().ok(),
            timeout_secs = self.timeout_secs,
            "Fan-out server running"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Fan-out server cancelled");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((n, from)) => self.on_inbound_datagram(&buf[..n], from, &mut handler),
                    Err(e) => warn!(error = %e, "Datagram receive error"),
                },
                event = events.recv() => match event {
                    Some(event) => {
                        debug!(?event, "broadcasting event");
                        self.broadcast(&event.encode()).await;
                    }
                    None => {
                        info!("Event channel closed, stopping fan-out server");
                        break;
                    }
                },
            }
        }

        info!(clients = self.registry.len(), "Closing endpoint");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
