/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! EasyLap timing service
//!
//! Decodes the byte stream of an EasyLap lap counter into timing events and
//! fans them out over UDP to every display client that keeps sending `HELLO`.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── event        – TimingEvent + JSON wire record
//! ├── decoder/     – sliding-window frame decoder over a byte arena
//! ├── registry     – soft-state client membership
//! ├── server/      – UDP fan-out server (membership, commands, broadcast)
//! ├── ingest/      – sensor transports + reconnecting ingestion loop
//! ├── command      – LIGHTS command parsing and dispatch
//! ├── indicator    – indicator light bank
//! ├── discovery    – service advertisement interface
//! ├── config/      – YAML service configuration
//! └── service      – start-up / shutdown wiring
//! ```

pub mod command;
pub mod config;
pub mod decoder;
pub mod discovery;
pub mod event;
pub mod indicator;
pub mod ingest;
pub mod registry;
pub mod server;
pub mod service;
