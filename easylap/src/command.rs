/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Inbound control commands.
//!
//! Any datagram that is not a membership literal is treated as command text
//! of the form `<KEYWORD> <ARG>`.  The only keyword is `LIGHTS`:
//!
//! | Text | Effect |
//! |---|---|
//! | `LIGHTS ON` | every indicator channel on |
//! | `LIGHTS OFF` | every channel off |
//! | `LIGHTS <n>` | channel mask `n`, `0..=65535` |
//!
//! Errors stay local to the server: the sender gets no reply.

use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::indicator::{Indicator, IndicatorError};

/// Keyword of the indicator command.
pub const LIGHTS: &str = "LIGHTS";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("{command}: missing argument")]
    MissingArgument { command: &'static str },

    #[error("{command}: invalid argument '{arg}' (expected ON, OFF or 0..=65535)")]
    InvalidArgument { command: &'static str, arg: String },

    #[error("indicator rejected command: {0}")]
    Indicator(#[from] IndicatorError),
}

// ── Command ───────────────────────────────────────────────────────────────────

/// Argument of a `LIGHTS` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lights {
    On,
    Off,
    /// Raw channel mask; the indicator range-checks it.
    Value(i64),
}

/// A parsed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Lights(Lights),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.split_whitespace();
        let keyword = parts.next().ok_or(CommandError::Empty)?;
        if keyword != LIGHTS {
            return Err(CommandError::Unknown(keyword.to_string()));
        }

        let arg = parts
            .next()
            .ok_or(CommandError::MissingArgument { command: LIGHTS })?;
        if let Some(extra) = parts.next() {
            return Err(CommandError::InvalidArgument {
                command: LIGHTS,
                arg: format!("{arg} {extra}"),
            });
        }

        let lights = match arg {
            "ON" => Lights::On,
            "OFF" => Lights::Off,
            n => {
                let value: i64 = n.parse().map_err(|_| CommandError::InvalidArgument {
                    command: LIGHTS,
                    arg: n.to_string(),
                })?;
                Lights::Value(value)
            }
        };
        Ok(Command::Lights(lights))
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Receives command text from the fan-out server.
pub trait CommandHandler: Send {
    fn handle(&mut self, text: &str) -> Result<(), CommandError>;
}

/// Parses command text and drives the indicator bank.
#[derive(Debug)]
pub struct CommandDispatcher<I> {
    indicator: I,
}

impl<I: Indicator> CommandDispatcher<I> {
    pub fn new(indicator: I) -> Self {
        Self { indicator }
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Execute an already parsed command.
    pub fn execute(&mut self, command: Command) -> Result<(), CommandError> {
        debug!(?command, "executing command");
        match command {
            Command::Lights(Lights::On) => self.indicator.on()?,
            Command::Lights(Lights::Off) => self.indicator.off()?,
            Command::Lights(Lights::Value(value)) => self.indicator.set(value)?,
        }
        Ok(())
    }
}

impl<I: Indicator> CommandHandler for CommandDispatcher<I> {
    fn handle(&mut self, text: &str) -> Result<(), CommandError> {
        let command: Command = text.parse()?;
        self.execute(command)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
