//! ARP CLI - the `arp` command
//!
//! Every subcommand prints one JSON document on stdout. Failures print
//! `{"error": ..., "kind": ...}` on stderr and exit with status 1.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cli;
pub mod commands;
pub mod output;
pub mod telemetry;

pub use cli::Cli;
pub use commands::{error_envelope, error_kind, run, Pipeline, UsageError};
