/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Soft-state client membership.
//!
//! Clients stay registered only while they keep sending `HELLO`.  The
//! registry itself has no timer: the fan-out server calls
//! [`ClientRegistry::purge`] after every inbound datagram and every
//! broadcast, so an entry outlives its timeout by at most one interaction.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

/// Seconds without a `HELLO` after which a client is dropped.
pub const CLIENT_TIMEOUT_SECS: u64 = 15;

/// Current wall-clock time in whole seconds since the Unix epoch.
///
/// A clock set before 1970 reads as `0`.
pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Membership entry for one client endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRecord {
    pub endpoint: SocketAddr,
    pub last_seen_epoch_secs: u64,
}

impl ClientRecord {
    /// Returns `true` if the record is older than `timeout_secs` at `now`.
    pub fn is_expired(&self, now: u64, timeout_secs: u64) -> bool {
        now.saturating_sub(self.last_seen_epoch_secs) > timeout_secs
    }
}

/// Endpoint → [`ClientRecord`] map owned by the fan-out server.
///
/// `BTreeMap` keeps [`snapshot`](Self::snapshot) order deterministic.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<SocketAddr, ClientRecord>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `endpoint` or refresh its last-seen time.
    ///
    /// Returns `true` if the endpoint was not registered before.
    pub fn touch(&mut self, endpoint: SocketAddr, now: u64) -> bool {
        let record = ClientRecord {
            endpoint,
            last_seen_epoch_secs: now,
        };
        let added = self.clients.insert(endpoint, record).is_none();
        if added {
            info!(client = %endpoint, "Adding client");
        }
        added
    }

    /// Forget `endpoint`.  No-op if it is not registered.
    pub fn remove(&mut self, endpoint: &SocketAddr) -> bool {
        let removed = self.clients.remove(endpoint).is_some();
        if removed {
            info!(client = %endpoint, "Removing client");
        }
        removed
    }

    /// Drop every client not seen for more than `timeout_secs`.
    pub fn purge(&mut self, now: u64, timeout_secs: u64) {
        self.clients.retain(|endpoint, record| {
            let keep = !record.is_expired(now, timeout_secs);
            if !keep {
                info!(
                    client = %endpoint,
                    idle_secs = now.saturating_sub(record.last_seen_epoch_secs),
                    "Removing client (timed out)"
                );
            }
            keep
        });
    }

    /// Owned copy of the registered endpoints, safe to iterate while the
    /// registry is mutated.
    pub fn snapshot(&self) -> Vec<SocketAddr> {
        self.clients.keys().copied().collect()
    }

    pub fn get(&self, endpoint: &SocketAddr) -> Option<&ClientRecord> {
        self.clients.get(endpoint)
    }

    pub fn contains(&self, endpoint: &SocketAddr) -> bool {
        self.clients.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], port))
    }

    const T0: u64 = 1_700_000_000;

    #[test]
    fn purge_after_timeout_removes_client() {
        let mut reg = ClientRegistry::new();
        reg.touch(addr(5006), T0);
        reg.purge(T0 + 16, CLIENT_TIMEOUT_SECS);
        assert!(!reg.contains(&addr(5006)));
    }

    #[test]
    fn purge_within_timeout_retains_client() {
        let mut reg = ClientRegistry::new();
        reg.touch(addr(5006), T0);
        reg.purge(T0 + 10, CLIENT_TIMEOUT_SECS);
        assert!(reg.contains(&addr(5006)));
    }

    #[test]
    fn purge_at_exact_timeout_retains_client() {
        let mut reg = ClientRegistry::new();
        reg.touch(addr(5006), T0);
        reg.purge(T0 + CLIENT_TIMEOUT_SECS, CLIENT_TIMEOUT_SECS);
        assert!(reg.contains(&addr(5006)));
    }

    #[test]
    fn touch_refreshes_last_seen() {
        let mut reg = ClientRegistry::new();
        assert!(reg.touch(addr(1), T0));
        assert!(!reg.touch(addr(1), T0 + 10));
        reg.purge(T0 + 20, CLIENT_TIMEOUT_SECS);
        assert_eq!(reg.get(&addr(1)).unwrap().last_seen_epoch_secs, T0 + 10);
    }

    #[test]
    fn touch_remove_touch_re_registers_with_fresh_timestamp() {
        let mut reg = ClientRegistry::new();
        reg.touch(addr(1), T0);
        assert!(reg.remove(&addr(1)));
        assert!(reg.touch(addr(1), T0 + 5));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&addr(1)).unwrap().last_seen_epoch_secs, T0 + 5);
    }

    #[test]
    fn remove_unknown_endpoint_is_noop() {
        let mut reg = ClientRegistry::new();
        reg.touch(addr(1), T0);
        assert!(!reg.remove(&addr(2)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn purge_only_removes_expired_entries() {
        let mut reg = ClientRegistry::new();
        reg.touch(addr(1), T0);
        reg.touch(addr(2), T0 + 10);
        reg.purge(T0 + 20, CLIENT_TIMEOUT_SECS);
        assert_eq!(reg.snapshot(), vec![addr(2)]);
    }

    #[test]
    fn clock_going_backwards_does_not_expire() {
        let mut reg = ClientRegistry::new();
        reg.touch(addr(1), T0);
        reg.purge(T0 - 100, CLIENT_TIMEOUT_SECS);
        assert!(reg.contains(&addr(1)));
    }

    #[test]
    fn snapshot_is_detached_from_registry() {
        let mut reg = ClientRegistry::new();
        reg.touch(addr(1), T0);
        reg.touch(addr(2), T0);
        let snap = reg.snapshot();
        for ep in &snap {
            reg.remove(ep);
        }
        assert!(reg.is_empty());
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn endpoints_differing_only_by_port_are_distinct() {
        let mut reg = ClientRegistry::new();
        reg.touch(addr(5006), T0);
        reg.touch(addr(5007), T0);
        assert_eq!(reg.len(), 2);
    }
}
