//! SIGINT/SIGTERM handling for commands that hold resources until told to stop.

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Registered shutdown signal streams.
///
/// Install before announcing readiness so a signal sent right after the
/// announcement is never handled by the default disposition.
#[derive(Debug)]
pub struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    pub fn install() -> Result<Self> {
        let interrupt =
            signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;
        let terminate =
            signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;
        Ok(Self {
            interrupt,
            terminate,
        })
    }

    /// Wait for the first SIGINT or SIGTERM.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => tracing::info!("Received SIGINT"),
            _ = self.terminate.recv() => tracing::info!("Received SIGTERM"),
        }
    }
}
