/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Growable byte arena with a consume-from-front cursor.
//!
//! Consuming advances `start` instead of shifting the vector, so dropping one
//! garbage byte at a time is O(1).  The dead prefix is reclaimed in
//! [`RawBuffer::extend`] once it is at least as large as the live region,
//! which keeps the total copying linear in the number of bytes ingested.

/// Pending, not yet interpreted sensor bytes.
#[derive(Debug, Default, Clone)]
pub struct RawBuffer {
    data: Vec<u8>,
    /// Index of the first unconsumed byte in `data`.
    start: usize,
}

impl RawBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes at the back.
    pub fn extend(&mut self, bytes: &[u8]) {
        if self.start > 0 && self.start >= self.len() {
            self.data.drain(..self.start);
            self.start = 0;
        }
        self.data.extend_from_slice(bytes);
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The unconsumed bytes, front first.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..]
    }

    /// Byte at `offset` from the front, if buffered.
    pub fn peek(&self, offset: usize) -> Option<u8> {
        self.as_slice().get(offset).copied()
    }

    /// Drop up to `n` bytes from the front and return how many were dropped.
    pub fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.len());
        self.start += n;
        if self.start == self.data.len() {
            self.data.clear();
            self.start = 0;
        }
        n
    }

    /// Allocated capacity of the arena (live bytes + reclaimable prefix).
    pub fn footprint(&self) -> usize {
        self.data.len()
    }
}
