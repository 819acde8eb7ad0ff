/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Indicator light bank.
//!
//! The start-light bar is driven through a 16-pin port expander, one pin per
//! light.  Driving the real expander is platform code living outside this
//! crate; the service only needs the [`Indicator`] trait.
//! [`SimulatedIndicator`] keeps the pin state in memory and logs changes,
//! which is what the service runs with on development machines.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

/// Number of indicator channels (one bit each in a mask).
pub const CHANNELS: usize = 16;

/// Every channel lit.
pub const ALL_ON: u16 = 0xFFFF;

/// Shown while the service is up and waiting for the sensor.  The first light
/// of the 5-light bar is wired to pin 2, hence bits 3 and 5.
pub const WAITING_PATTERN: u16 = (1 << 3) | (1 << 5);

#[derive(Debug, Error)]
pub enum IndicatorError {
    /// Requested mask does not fit in [`CHANNELS`] bits.
    #[error("indicator value {0} out of range (0..=65535)")]
    OutOfRange(i64),

    /// The driver failed to apply the mask.
    #[error("indicator driver failure: {0}")]
    Driver(String),
}

/// A bank of [`CHANNELS`] on/off lights.
pub trait Indicator: Send {
    /// Drive every channel from `mask`; bit N controls channel N.
    fn apply(&mut self, mask: u16) -> Result<(), IndicatorError>;

    /// Range-checked variant of [`apply`](Self::apply).  Nothing changes when
    /// `value` is rejected.
    fn set(&mut self, value: i64) -> Result<(), IndicatorError> {
        let mask = u16::try_from(value).map_err(|_| IndicatorError::OutOfRange(value))?;
        self.apply(mask)
    }

    fn on(&mut self) -> Result<(), IndicatorError> {
        self.set(i64::from(ALL_ON))
    }

    fn off(&mut self) -> Result<(), IndicatorError> {
        self.set(0)
    }
}

// ── SimulatedIndicator ────────────────────────────────────────────────────────

/// In-memory indicator bank.
#[derive(Debug, Default, Clone)]
pub struct SimulatedIndicator {
    channels: [bool; CHANNELS],
    writes: u64,
}

impl SimulatedIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state packed back into a mask.
    pub fn mask(&self) -> u16 {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, lit)| **lit)
            .fold(0u16, |m, (i, _)| m | (1 << i))
    }

    /// Number of successful [`apply`](Indicator::apply) calls.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl Indicator for SimulatedIndicator {
    fn apply(&mut self, mask: u16) -> Result<(), IndicatorError> {
        for (i, lit) in self.channels.iter_mut().enumerate() {
            *lit = mask & (1 << i) != 0;
        }
        self.writes += 1;
        debug!(mask = %format!("{mask:#06x}"), "indicator set");
        Ok(())
    }
}

// ── Shared handle ─────────────────────────────────────────────────────────────

/// Shared indicator: the command dispatcher and the service lifecycle both
/// drive the same bank.
pub type SharedIndicator<I> = Arc<Mutex<I>>;

impl<I: Indicator> Indicator for Arc<Mutex<I>> {
    fn apply(&mut self, mask: u16) -> Result<(), IndicatorError> {
        let mut inner = self
            .lock()
            .map_err(|_| IndicatorError::Driver("indicator lock poisoned".into()))?;
        inner.apply(mask)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_sets_one_channel_per_bit() {
        let mut ind = SimulatedIndicator::new();
        ind.apply(WAITING_PATTERN).unwrap();
        assert_eq!(ind.mask(), 0b10_1000);
        assert_eq!(ind.writes(), 1);
    }

    #[test]
    fn on_and_off_drive_every_channel() {
        let mut ind = SimulatedIndicator::new();
        ind.on().unwrap();
        assert_eq!(ind.mask(), ALL_ON);
        ind.off().unwrap();
        assert_eq!(ind.mask(), 0);
    }

    #[test]
    fn set_rejects_values_above_16_bits_without_change() {
        let mut ind = SimulatedIndicator::new();
        ind.apply(0x00F0).unwrap();
        let err = ind.set(70_000).unwrap_err();
        assert!(matches!(err, IndicatorError::OutOfRange(70_000)));
        assert_eq!(ind.mask(), 0x00F0);
        assert_eq!(ind.writes(), 1);
    }

    #[test]
    fn set_rejects_negative_values() {
        let mut ind = SimulatedIndicator::new();
        assert!(ind.set(-1).is_err());
        assert_eq!(ind.writes(), 0);
    }

    #[test]
    fn shared_handle_drives_inner_indicator() {
        let shared: SharedIndicator<SimulatedIndicator> =
            Arc::new(Mutex::new(SimulatedIndicator::new()));
        let mut handle = shared.clone();
        handle.set(0x0003).unwrap();
        assert_eq!(shared.lock().unwrap().mask(), 0x0003);
    }
}
