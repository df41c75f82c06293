//! Subcommands of the `mmrepl` binary

pub mod config;
pub mod history;
