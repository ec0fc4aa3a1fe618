//! CLI module for tgwc.
//!
//! This module provides the command-line interface for managing
//! Connect attachments and peers.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, ResourceKindArg, SchemaKind, StateCommands};
pub use output::OutputFormatter;
