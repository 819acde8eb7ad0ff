/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Sensor byte sources.
//!
//! The lap counter sits behind a USB–UART bridge (38400 baud, 8N1, no flow
//! control).  The service only needs "open a readable byte stream", so the
//! physical link is hidden behind [`Transport`]:
//!
//! * [`DeviceTransport`] opens and configures the serial port, then bridges
//!   its blocking reads into async ones with [`port_reader`].
//! * [`FakeTransport`] replays a short development capture so the whole
//!   pipeline can run without hardware.

use std::io::{self, Read};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::runtime::Handle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use super::{TransportError, DEFAULT_READ_CHUNK};

/// An open sensor byte stream.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Something that can (re)open the sensor byte stream.
///
/// `#[async_trait]` keeps the trait object-safe so the service can hold a
/// `Box<dyn Transport>` chosen at runtime.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Open a fresh stream.  Called again after every transport failure.
    async fn open(&self) -> Result<ByteSource, TransportError>;
}

// ── DeviceTransport ───────────────────────────────────────────────────────────

/// Line speed of the EasyLap UART bridge.
pub const SENSOR_BAUD_RATE: u32 = 38_400;

/// Read timeout of the serial port.  A pump notices that its stream was
/// dropped within one timeout.
pub const PORT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes buffered between a port pump and its reader.
const PUMP_CAPACITY: usize = 1024;

/// Serial sensor link, 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct DeviceTransport {
    path: PathBuf,
    baud_rate: u32,
}

impl DeviceTransport {
    pub fn new(path: impl Into<PathBuf>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }
}

#[async_trait]
impl Transport for DeviceTransport {
    fn describe(&self) -> String {
        format!("serial {} @ {} baud", self.path.display(), self.baud_rate)
    }

    async fn open(&self) -> Result<ByteSource, TransportError> {
        let path = self.path.to_string_lossy().into_owned();
        let baud_rate = self.baud_rate;
        let opened = tokio::task::spawn_blocking(move || {
            serialport::new(path, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(PORT_POLL_TIMEOUT)
                .open()
                .map_err(io::Error::from)
        })
        .await
        .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)));

        let port = opened.map_err(|source| TransportError::Open {
            target: self.describe(),
            source,
        })?;
        Ok(port_reader(port))
    }
}

/// Bridge a blocking reader into a [`ByteSource`].
///
/// `port` is expected to time out its reads (a serial port opened with
/// [`PORT_POLL_TIMEOUT`]).  The pump runs on the blocking pool: timed-out
/// reads are idle polls, any other error or a zero-length read ends the
/// stream.  Once the returned source is dropped the pump exits after at most
/// one read timeout, so a silent sensor never holds up runtime shutdown.
///
/// Must be called from within a Tokio runtime.
pub fn port_reader<R>(mut port: R) -> ByteSource
where
    R: Read + Send + 'static,
{
    let (mut writer, reader) = tokio::io::duplex(PUMP_CAPACITY);
    let stop = CancellationToken::new();
    let pump_stop = stop.clone();
    let runtime = Handle::current();

    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; DEFAULT_READ_CHUNK];
        while !pump_stop.is_cancelled() {
            match port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    // Fails once the reader half is gone.
                    if runtime.block_on(writer.write_all(&buf[..n])).is_err() {
                        break;
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    warn!(error = %e, "Serial read failed");
                    break;
                }
            }
        }
        debug!("serial pump stopped");
    });

    Box::new(PortStream {
        inner: reader,
        _stop: stop.drop_guard(),
    })
}

/// Read half of a port pump.  Dropping it stops the pump.
struct PortStream {
    inner: DuplexStream,
    _stop: DropGuard,
}

impl AsyncRead for PortStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

// ── FakeTransport ─────────────────────────────────────────────────────────────

/// Development capture: a timer frame, line noise, a garbage-prefixed timer
/// frame split across two reads, then a car frame for transponder 1.
///
/// The bridge capture this replays had six bytes in the fourth chunk.  One
/// zero is appended there: every decoded frame consumes one trailing byte
/// past its nominal length, and without it the car frame's sync byte would
/// be swallowed as the split timer frame's trailing byte.
pub const DEV_CAPTURE: &[&[u8]] = &[
    &[0x0B, 0x00, 0x83, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    &[0xDE, 0xAD, 0xBE, 0xEF],
    &[0x00, 0x0B, 0x00, 0x83, 0x01, 0x00],
    &[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    &[
        0x0D, 0x00, 0x84, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ],
];

/// Replays canned chunks forever, one chunk per `interval`.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    chunks: Vec<Vec<u8>>,
    interval: Duration,
}

impl FakeTransport {
    /// Replay [`DEV_CAPTURE`].
    pub fn new(interval: Duration) -> Self {
        Self::with_chunks(DEV_CAPTURE.iter().map(|c| c.to_vec()).collect(), interval)
    }

    pub fn with_chunks(chunks: Vec<Vec<u8>>, interval: Duration) -> Self {
        Self { chunks, interval }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn describe(&self) -> String {
        format!("fake sensor ({} chunks every {:?})", self.chunks.len(), self.interval)
    }

    async fn open(&self) -> Result<ByteSource, TransportError> {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let chunks = self.chunks.clone();
        let interval = self.interval;

        // The writer task ends as soon as the reader half is dropped.
        tokio::spawn(async move {
            for chunk in chunks.iter().cycle() {
                tokio::time::sleep(interval).await;
                if writer.write_all(chunk).await.is_err() {
                    break;
                }
            }
            debug!("fake sensor stopped");
        });
        Ok(Box::new(reader))
    }
}
