//! Command implementations for the upguard CLI

pub mod force_unlock;
pub mod holder;
pub mod install;
pub mod lock;
pub mod status;

use std::{path::Path, process::ExitCode};

use anyhow::{Context, Result};
use upguard_core::Coordinator;

/// How a command finished when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Another process holds the update lock
    Contended,
}

impl Outcome {
    pub const fn code(self) -> u8 {
        match self {
            Self::Done => 0,
            Self::Contended => 2,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        Self::from(outcome.code())
    }
}

/// Build the coordinator from `--config`, the environment and defaults.
pub fn coordinator(config_path: Option<&Path>) -> Result<Coordinator> {
    Coordinator::from_env(config_path).context("Failed to load upguard configuration")
}

fn describe_holder(holder_pid: Option<u32>) -> String {
    holder_pid.map_or_else(|| "unknown pid".to_string(), |pid| format!("pid {pid}"))
}
