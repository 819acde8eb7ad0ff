/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Frame decoder for the EasyLap serial byte stream.
//!
//! The lap counter emits two fixed-layout frames, identified by their first
//! (sync) byte and confirmed by a tag byte at offset 2:
//!
//! ```text
//! timer frame (11 bytes)
//! ┌──────┬────┬──────┬──────────────────────┬─────────────┐
//! │ 0x0B │ ?? │ 0x83 │ ticks b3 b4 b5 b6    │ 4 × unused  │
//! └──────┴────┴──────┴──────────────────────┴─────────────┘
//!
//! car frame (13 bytes)
//! ┌──────┬────┬──────┬──────────┬────────┬───────────────────┬──────────┐
//! │ 0x0D │ ?? │ 0x84 │ uid b3 b4│ 2 × ?? │ ticks b7 b8 b9 b10│ 2 × ??   │
//! └──────┴────┴──────┴──────────┴────────┴───────────────────┴──────────┘
//! ```
//!
//! The serial bridge does not frame anything, so the decoder works on a
//! sliding window: a leading byte that is not a sync byte, or a sync byte
//! whose tag does not match, is dropped on its own and the window is
//! re-inspected.  A single lost or duplicated byte therefore costs at most
//! the frame it hit.
//!
//! # Compatibility quirks
//!
//! Two behaviours are kept exactly as deployed display clients observe them:
//!
//! * The fourth timestamp byte is shifted by 32, not 24.  On a 32-bit value
//!   it contributes nothing, so only the low three bytes of the tick counter
//!   are reported.
//! * Every decoded frame consumes one byte more than its length.  When the
//!   extra byte has not arrived yet it is owed and dropped on arrival, which
//!   keeps the output independent of how the stream was chunked.
//!
//! Both are pinned by tests; confirm against hardware captures before
//! changing either.

pub mod buffer;

use tracing::trace;

use crate::event::TimingEvent;
pub use buffer::RawBuffer;

// ── Frame constants ───────────────────────────────────────────────────────────

/// Sync byte of a timer-beam frame.
pub const TIMER_SYNC: u8 = 0x0B;
/// Tag byte expected at [`TAG_OFFSET`] of a timer frame.
pub const TIMER_TAG: u8 = 0x83;
/// Timer frame length in bytes.
pub const TIMER_FRAME_LEN: usize = 11;

/// Sync byte of a car-transponder frame.
pub const CAR_SYNC: u8 = 0x0D;
/// Tag byte expected at [`TAG_OFFSET`] of a car frame.
pub const CAR_TAG: u8 = 0x84;
/// Car frame length in bytes.
pub const CAR_FRAME_LEN: usize = 13;

/// Offset of the frame-type tag byte.
pub const TAG_OFFSET: usize = 2;

/// Bytes consumed after each decoded frame beyond its declared length.
pub const TRAILING_SKIP: usize = 1;

// ── Statistics ────────────────────────────────────────────────────────────────

/// Running counters, useful for logging link quality.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames decoded into events.
    pub frames: u64,
    /// Bytes dropped by the resynchronisation path.
    pub garbage_bytes: u64,
    /// Bytes dropped as the post-frame trailing skip.
    pub skipped_bytes: u64,
}

/// Outcome of one inspection of the window front.
enum Step {
    Event(TimingEvent),
    Dropped,
    NeedMore,
}

// ── FrameDecoder ──────────────────────────────────────────────────────────────

/// Stateful sliding-window parser.
///
/// Feed bytes with [`push`](Self::push) and pull events with
/// [`next_event`](Self::next_event); `None` means "not enough bytes yet",
/// never an error.  Malformed input is discarded silently.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: RawBuffer,
    /// Trailing-skip bytes still to drop once they arrive.
    owed: usize,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        trace!(len = bytes.len(), bytes = ?bytes, "decoder input");
        self.buf.extend(bytes);
    }

    /// Decode the next event from the buffered bytes, if a whole frame is
    /// available.
    pub fn next_event(&mut self) -> Option<TimingEvent> {
        loop {
            match self.step() {
                Step::Event(ev) => return Some(ev),
                Step::Dropped => continue,
                Step::NeedMore => return None,
            }
        }
    }

    /// Convenience: push `bytes` and collect every event they complete.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<TimingEvent> {
        self.push(bytes);
        std::iter::from_fn(|| self.next_event()).collect()
    }

    /// Number of bytes waiting for more input.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Bytes held by the receive arena, including the reclaimable prefix.
    pub fn footprint(&self) -> usize {
        self.buf.footprint()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn step(&mut self) -> Step {
        if self.owed > 0 {
            let n = self.buf.consume(self.owed);
            self.owed -= n;
            self.stats.skipped_bytes += n as u64;
            if self.owed > 0 {
                return Step::NeedMore;
            }
        }

        match self.buf.peek(0) {
            None => Step::NeedMore,
            Some(TIMER_SYNC) => self.try_frame(TIMER_TAG, TIMER_FRAME_LEN, decode_timer_frame),
            Some(CAR_SYNC) => self.try_frame(CAR_TAG, CAR_FRAME_LEN, decode_car_frame),
            Some(_) => self.drop_garbage(),
        }
    }

    fn try_frame(&mut self, tag: u8, len: usize, decode: fn(&[u8]) -> TimingEvent) -> Step {
        match self.buf.peek(TAG_OFFSET) {
            Some(t) if t != tag => return self.drop_garbage(),
            _ => {}
        }
        if self.buf.len() < len {
            return Step::NeedMore;
        }

        let event = decode(&self.buf.as_slice()[..len]);
        self.buf.consume(len);
        self.owed = TRAILING_SKIP;
        self.stats.frames += 1;
        trace!(?event, "frame decoded");
        Step::Event(event)
    }

    fn drop_garbage(&mut self) -> Step {
        self.buf.consume(1);
        self.stats.garbage_bytes += 1;
        Step::Dropped
    }
}

// ── Field decoding ────────────────────────────────────────────────────────────

/// Little-endian tick counter starting at `at`, with the deployed shift
/// sequence (0, 8, 16, 32).
fn ticks_at(frame: &[u8], at: usize) -> u32 {
    let raw = u64::from(frame[at])
        | u64::from(frame[at + 1]) << 8
        | u64::from(frame[at + 2]) << 16
        | u64::from(frame[at + 3]) << 32;
    raw as u32
}

fn decode_timer_frame(frame: &[u8]) -> TimingEvent {
    TimingEvent::timer(ticks_at(frame, 3))
}

fn decode_car_frame(frame: &[u8]) -> TimingEvent {
    let car_id = u16::from(frame[3]) | u16::from(frame[4]) << 8;
    TimingEvent::car(car_id, ticks_at(frame, 7))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
