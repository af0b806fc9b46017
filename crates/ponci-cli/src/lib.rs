//! ponci command line
//!
//! Argument parsing, TOML configuration and command dispatch for the `ponci`
//! binary. The cgroup work itself lives in `ponci-core`.

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands, WaitState};
pub use commands::execute;
pub use config::{Config, LogConfig};
