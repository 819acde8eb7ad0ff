/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Error type for the fan-out server.
//!
//! Only endpoint acquisition can fail at this layer.  Everything that happens
//! per datagram (bad commands, per-client send failures, receive errors) is
//! logged inside the server and never surfaces here, so one misbehaving
//! client cannot take the service down.

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The datagram endpoint could not be acquired.  Fatal: the service has
    /// no other interface to serve through.
    #[error("cannot bind datagram endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The bound socket could not report its local address.
    #[error("cannot read local address of datagram endpoint: {0}")]
    LocalAddr(#[source] std::io::Error),
}
