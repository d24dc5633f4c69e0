//! Hookbin - self-hosted HTTP request inspector.
//!
//! This crate holds the pieces of the `hookbin` binary that are worth
//! testing on their own:
//!
//! - [`cli`] - command line and `HOOKBIN_*` environment configuration
//! - [`logging`] - console and rolling file logging
//! - [`retention`] - background deletion of expired requests and sessions

pub mod cli;
pub mod logging;
pub mod retention;

pub use cli::Args;
pub use retention::{spawn_sweeper, sweep_once, RetentionPolicy};
