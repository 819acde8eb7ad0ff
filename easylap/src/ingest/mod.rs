/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Sensor ingestion.
//!
//! ```text
//! Transport::open ──► EventStream (read + FrameDecoder) ──► mpsc ──► FanoutServer
//!        ▲                      │ TransportError
//!        └──── retry_delay ◄────┘
//! ```
//!
//! The sensor can be power-cycled or unplugged at any time during a race.  A
//! failed open, a read error and end-of-stream are all treated the same way:
//! log, wait, reopen.  The fan-out server keeps serving its clients in the
//! meantime.

pub mod transport;

pub use transport::{
    port_reader, ByteSource, DeviceTransport, FakeTransport, Transport, PORT_POLL_TIMEOUT,
    SENSOR_BAUD_RATE,
};

use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder::FrameDecoder;
use crate::event::TimingEvent;

/// Read size per call; the UART bridge delivers at most 63 bytes per report.
pub const DEFAULT_READ_CHUNK: usize = 64;

/// Pause before (re)opening the transport.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot open {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sensor read failed: {0}")]
    Read(#[source] std::io::Error),

    /// End of stream.  Distinct from "no data yet", which simply waits.
    #[error("sensor stream closed")]
    Closed,
}

// ── EventStream ───────────────────────────────────────────────────────────────

/// One open byte source driven through a [`FrameDecoder`].
pub struct EventStream {
    reader: ByteSource,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl EventStream {
    pub fn new(reader: ByteSource, read_chunk: usize) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            chunk: vec![0u8; read_chunk.max(1)],
        }
    }

    /// Wait for the next decoded event.
    ///
    /// # Errors
    /// Returns a [`TransportError`] when the source fails or ends; the stream
    /// should then be dropped and the transport reopened.
    pub async fn next_event(&mut self) -> Result<TimingEvent, TransportError> {
        loop {
            if let Some(event) = self.decoder.next_event() {
                return Ok(event);
            }
            let n = self
                .reader
                .read(&mut self.chunk)
                .await
                .map_err(TransportError::Read)?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.decoder.push(&self.chunk[..n]);
        }
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}

// ── Ingestion loop ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub retry_delay: Duration,
    pub read_chunk: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

/// Why one connection ended without a transport error.
enum Stop {
    Cancelled,
    ReceiverGone,
}

/// Keep the sensor connected and forward every decoded event to `events`.
///
/// Returns when `cancel` fires or the receiving side of `events` is dropped;
/// transport failures never end the loop.
pub async fn run_ingestion<T>(
    transport: &T,
    events: mpsc::Sender<TimingEvent>,
    options: IngestOptions,
    cancel: CancellationToken,
) where
    T: Transport + ?Sized,
{
    info!(transport = %transport.describe(), "Ingestion started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(options.retry_delay) => {}
        }

        match ingest_once(transport, &events, options, &cancel).await {
            Ok(Stop::Cancelled) => break,
            Ok(Stop::ReceiverGone) => {
                info!("Event receiver gone, stopping ingestion");
                break;
            }
            Err(e) => warn!(
                error = %e,
                retry_in = ?options.retry_delay,
                "Sensor transport error, reconnecting"
            ),
        }
    }
    info!("Ingestion stopped");
}

async fn ingest_once<T>(
    transport: &T,
    events: &mpsc::Sender<TimingEvent>,
    options: IngestOptions,
    cancel: &CancellationToken,
) -> Result<Stop, TransportError>
where
    T: Transport + ?Sized,
{
    let reader = transport.open().await?;
    info!(transport = %transport.describe(), "Sensor connected");
    let mut stream = EventStream::new(reader, options.read_chunk);

    let result = loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break Ok(Stop::Cancelled),
            next = stream.next_event() => match next {
                Ok(event) => event,
                Err(e) => break Err(e),
            },
        };
        debug!(?event, "event decoded");
        if events.send(event).await.is_err() {
            break Ok(Stop::ReceiverGone);
        }
    };

    let stats = stream.decoder().stats();
    debug!(
        frames = stats.frames,
        garbage_bytes = stats.garbage_bytes,
        skipped_bytes = stats.skipped_bytes,
        buffered = stream.decoder().buffered(),
        footprint = stream.decoder().footprint(),
        "Sensor stream finished"
    );
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Cursor, Read};
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use tokio::io::{AsyncRead, ReadBuf};

    const TIMER_T1: [u8; 11] = [0x0B, 0x00, 0x83, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    const CAR_5_T9: [u8; 13] = [
        0x0D, 0x00, 0x84, 0x05, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    /// Reader that fails on the first poll, like an unplugged bridge.
    struct Unplugged;

    impl AsyncRead for Unplugged {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")))
        }
    }

    /// Blocking serial port stand-in: hands out queued reads, then idles with
    /// read timeouts like a UART with nothing on the line.
    struct IdlePort {
        reads: VecDeque<io::Result<Vec<u8>>>,
    }

    impl IdlePort {
        fn silent() -> Self {
            Self::with_reads(vec![])
        }

        fn with_reads(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self { reads: reads.into() }
        }
    }

    impl Read for IdlePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => {
                    std::thread::sleep(Duration::from_millis(20));
                    Err(io::ErrorKind::TimedOut.into())
                }
            }
        }
    }

    /// Opens a port that never sends a byte.
    struct SilentSerialTransport;

    #[async_trait]
    impl Transport for SilentSerialTransport {
        fn describe(&self) -> String {
            "silent serial".into()
        }

        async fn open(&self) -> Result<ByteSource, TransportError> {
            Ok(port_reader(IdlePort::silent()))
        }
    }

    enum Attempt {
        OpenFails,
        ReadFails,
        Data(Vec<u8>),
    }

    /// Plays one scripted attempt per `open`; fails to open once exhausted.
    struct ScriptedTransport {
        attempts: Mutex<VecDeque<Attempt>>,
        opens: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(attempts: Vec<Attempt>) -> Self {
            Self {
                attempts: Mutex::new(attempts.into()),
                opens: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn describe(&self) -> String {
            "scripted".into()
        }

        async fn open(&self) -> Result<ByteSource, TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let next = self.attempts.lock().unwrap().pop_front();
            match next {
                Some(Attempt::ReadFails) => Ok(Box::new(Unplugged)),
                Some(Attempt::Data(bytes)) => Ok(Box::new(Cursor::new(bytes))),
                Some(Attempt::OpenFails) | None => Err(TransportError::Open {
                    target: "scripted".into(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no device"),
                }),
            }
        }
    }

    fn fast() -> IngestOptions {
        IngestOptions {
            retry_delay: Duration::from_millis(10),
            read_chunk: 4,
        }
    }

    async fn recv(rx: &mut mpsc::Receiver<TimingEvent>) -> TimingEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    // ── EventStream ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn event_stream_decodes_across_small_reads() {
        let mut bytes = TIMER_T1.to_vec();
        bytes.push(0x00);
        bytes.extend_from_slice(&CAR_5_T9);
        let mut stream = EventStream::new(Box::new(Cursor::new(bytes)), 3);

        assert_eq!(stream.next_event().await.unwrap(), TimingEvent::timer(1));
        assert_eq!(stream.next_event().await.unwrap(), TimingEvent::car(5, 9));
        assert!(matches!(stream.next_event().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn event_stream_surfaces_read_errors() {
        let mut stream = EventStream::new(Box::new(Unplugged), DEFAULT_READ_CHUNK);
        assert!(matches!(stream.next_event().await, Err(TransportError::Read(_))));
    }

    // ── Transports ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn port_reader_delivers_bytes_across_idle_polls() {
        let port = IdlePort::with_reads(vec![
            Ok(CAR_5_T9[..5].to_vec()),
            Err(io::ErrorKind::TimedOut.into()),
            Ok(CAR_5_T9[5..].to_vec()),
        ]);
        let mut stream = EventStream::new(port_reader(port), DEFAULT_READ_CHUNK);

        let event = tokio::time::timeout(Duration::from_secs(2), stream.next_event())
            .await
            .expect("no event from serial port")
            .unwrap();
        assert_eq!(event, TimingEvent::car(5, 9));
    }

    #[tokio::test]
    async fn port_read_error_closes_stream() {
        let port = IdlePort::with_reads(vec![Err(io::ErrorKind::BrokenPipe.into())]);
        let mut stream = EventStream::new(port_reader(port), DEFAULT_READ_CHUNK);
        let next = tokio::time::timeout(Duration::from_secs(2), stream.next_event())
            .await
            .expect("stream did not close");
        assert!(matches!(next, Err(TransportError::Closed)));
    }

    #[test]
    fn silent_serial_port_does_not_block_runtime_shutdown() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (tx, _rx) = mpsc::channel(1);
            let cancel = CancellationToken::new();
            let task = tokio::spawn(run_ingestion(
                &SilentSerialTransport,
                tx,
                fast(),
                cancel.clone(),
            ));
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
            tokio::time::timeout(Duration::from_secs(2), task)
                .await
                .expect("ingestion did not stop")
                .unwrap();
        });

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            drop(runtime);
            let _ = done_tx.send(());
        });
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("runtime shutdown held up by the serial pump");
    }

    #[tokio::test]
    async fn device_transport_missing_path_is_open_error() {
        let transport = DeviceTransport::new("/nonexistent/ttyUSB9", SENSOR_BAUD_RATE);
        assert!(matches!(transport.open().await, Err(TransportError::Open { .. })));
    }

    #[tokio::test]
    async fn fake_transport_replays_dev_capture() {
        let transport = FakeTransport::new(Duration::from_millis(1));
        let mut stream = EventStream::new(transport.open().await.unwrap(), DEFAULT_READ_CHUNK);

        assert_eq!(stream.next_event().await.unwrap(), TimingEvent::timer(0));
        assert_eq!(stream.next_event().await.unwrap(), TimingEvent::timer(1));
        assert_eq!(stream.next_event().await.unwrap(), TimingEvent::car(1, 0));
        // The capture loops.
        assert_eq!(stream.next_event().await.unwrap(), TimingEvent::timer(0));
    }

    // ── Ingestion loop ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn ingestion_recovers_from_transport_failures() {
        let mut data = TIMER_T1.to_vec();
        data.push(0x00);
        data.extend_from_slice(&CAR_5_T9);
        let transport = std::sync::Arc::new(ScriptedTransport::new(vec![
            Attempt::OpenFails,
            Attempt::ReadFails,
            Attempt::Data(data),
        ]));

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = {
            let transport = transport.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { run_ingestion(&*transport, tx, fast(), cancel).await })
        };

        assert_eq!(recv(&mut rx).await, TimingEvent::timer(1));
        assert_eq!(recv(&mut rx).await, TimingEvent::car(5, 9));
        assert!(transport.opens.load(Ordering::SeqCst) >= 3);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("ingestion did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn ingestion_stops_when_receiver_is_dropped() {
        let transport = FakeTransport::new(Duration::from_millis(1));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        tokio::time::timeout(
            Duration::from_secs(2),
            run_ingestion(&transport, tx, fast(), CancellationToken::new()),
        )
        .await
        .expect("ingestion did not stop");
    }

    #[tokio::test]
    async fn ingestion_stops_on_cancel_while_disconnected() {
        let transport = ScriptedTransport::new(vec![]);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(
            Duration::from_secs(2),
            run_ingestion(&transport, tx, fast(), cancel),
        )
        .await
        .expect("ingestion did not stop");
    }
}
