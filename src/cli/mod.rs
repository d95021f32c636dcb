//! CLI module for silent-refactor - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
