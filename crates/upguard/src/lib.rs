//! Upguard - coordinate application update installs across processes
//!
//! Command-line front end over [`upguard_core`]: inspect and drive the
//! per-application update lock and query installer status.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod shutdown;

pub use commands::Outcome;
