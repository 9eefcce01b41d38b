//! CLI module for remindr - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for daemon management and
//! trigger operations.

pub mod commands;

pub use commands::Cli;
