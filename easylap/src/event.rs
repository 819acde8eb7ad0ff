/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Timing event data structures.
//!
//! Two types model the two sides of the pipeline:
//!
//! ```text
//! sensor bytes ──(FrameDecoder)──►  TimingEvent  ──(to_wire)──►  WireEvent JSON  ──(UDP)──►  clients
//!                                    ↑ decoded, typed               ↑ `{"time":..,"uid":..}`
//! ```
//!
//! # Ownership model
//! A `TimingEvent` is `Copy` and immutable once produced.  The decoder hands it
//! to the ingestion loop, which moves it through the event channel to the
//! fan-out server; the server serialises it exactly once per broadcast.

use serde::{Deserialize, Serialize};

// ── TimingEvent ───────────────────────────────────────────────────────────────

/// One decoded sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimingEvent {
    /// Sensor clock value carried by the frame.
    pub timestamp_ticks: u32,

    /// Car transponder id.  `0` means a generic timer-beam event.
    pub car_id: u16,
}

impl TimingEvent {
    /// Event from a timer frame (no transponder attached).
    pub fn timer(timestamp_ticks: u32) -> Self {
        Self {
            timestamp_ticks,
            car_id: 0,
        }
    }

    /// Event from a car frame.
    pub fn car(car_id: u16, timestamp_ticks: u32) -> Self {
        Self {
            timestamp_ticks,
            car_id,
        }
    }

    /// Returns `true` for generic timer-beam events.
    pub fn is_timer(&self) -> bool {
        self.car_id == 0
    }

    /// Wire representation of this event.
    pub fn to_wire(self) -> WireEvent {
        WireEvent {
            time: self.timestamp_ticks,
            uid: self.car_id,
        }
    }

    /// Serialise to the JSON bytes broadcast to clients.
    pub fn encode(self) -> Vec<u8> {
        self.to_wire().to_bytes()
    }
}

impl From<WireEvent> for TimingEvent {
    fn from(w: WireEvent) -> Self {
        Self {
            timestamp_ticks: w.time,
            car_id: w.uid,
        }
    }
}

// ── WireEvent ─────────────────────────────────────────────────────────────────

/// Wire-ready event record: exactly two named numeric fields.
///
/// Field names match what existing display clients parse.  Typed as `u32` /
/// `u16` so a client decoding with this struct rejects out-of-range values
/// instead of truncating them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    pub time: u32,
    pub uid: u16,
}

impl WireEvent {
    /// Compact JSON, e.g. `{"time":9,"uid":5}`.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serialising two integers into a Vec cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parse a broadcast datagram back into a record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_event_has_zero_car_id() {
        let ev = TimingEvent::timer(42);
        assert_eq!(ev.car_id, 0);
        assert!(ev.is_timer());
    }

    #[test]
    fn car_event_is_not_timer() {
        assert!(!TimingEvent::car(5, 9).is_timer());
    }

    #[test]
    fn encode_uses_time_and_uid_field_names() {
        let bytes = TimingEvent::car(5, 9).encode();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"time":9,"uid":5}"#);
    }

    #[test]
    fn wire_event_preserves_full_integer_range() {
        let ev = TimingEvent::car(u16::MAX, u32::MAX);
        let back: TimingEvent = WireEvent::from_bytes(&ev.encode()).unwrap().into();
        assert_eq!(back, ev);
    }

    #[test]
    fn wire_event_rejects_uid_outside_u16() {
        let result = WireEvent::from_bytes(br#"{"time":1,"uid":70000}"#);
        assert!(result.is_err());
    }

    #[test]
    fn wire_event_rejects_missing_field() {
        assert!(WireEvent::from_bytes(br#"{"time":1}"#).is_err());
    }
}
