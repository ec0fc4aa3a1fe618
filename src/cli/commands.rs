//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tgwc - Declarative Transit Gateway Connect manager.
#[derive(Parser, Debug)]
#[command(name = "tgwc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "TGWC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stack directory.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the stack configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Refresh state and display the apply plan.
    Plan,

    /// Apply the plan.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Continue on errors.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Re-read every recorded resource and save the result.
    Refresh,

    /// Adopt an existing remote object into state.
    Import {
        /// Kind of the object.
        kind: ResourceKindArg,

        /// Declared name to record it under.
        name: String,

        /// Remote identifier.
        id: String,
    },

    /// Find exactly one Connect attachment.
    Lookup {
        /// Attachment identifier.
        #[arg(long)]
        id: Option<String>,

        /// Server-side filter, `name=value1,value2`. Repeatable.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, Vec<String>)>,
    },

    /// Destroy every resource recorded in state.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the attribute schema of a resource or lookup.
    Schema {
        /// Which schema to print.
        kind: SchemaKind,
    },

    /// Manage local state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Lock the state.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to unlock.
        #[arg(long)]
        lock_id: Option<String>,

        /// Remove the lock whoever holds it.
        #[arg(long)]
        force: bool,
    },
}

/// Importable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKindArg {
    /// Connect attachment.
    Attachment,
    /// Connect peer.
    Peer,
}

/// Schemas the `schema` command can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaKind {
    /// Connect attachment resource.
    Attachment,
    /// Connect peer resource.
    Peer,
    /// Attachment lookup.
    AttachmentLookup,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parses `name=v1,v2` into a filter name and its values.
fn parse_filter(raw: &str) -> Result<(String, Vec<String>), String> {
    let (name, values) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value[,value...], got '{raw}'"))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(String::from("filter name cannot be empty"));
    }

    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();
    if values.is_empty() {
        return Err(format!("filter '{name}' needs at least one value"));
    }

    Ok((name.to_string(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        let (name, values) = parse_filter("tag:team=network, edge").unwrap();
        assert_eq!(name, "tag:team");
        assert_eq!(values, vec!["network", "edge"]);

        assert!(parse_filter("no-equals").is_err());
        assert!(parse_filter("=value").is_err());
        assert!(parse_filter("state=").is_err());
    }

    #[test]
    fn test_lookup_arguments() {
        let cli = Cli::try_parse_from([
            "tgwc",
            "lookup",
            "--filter",
            "state=available",
            "--filter",
            "tag:team=network",
        ])
        .unwrap();

        match cli.command {
            Commands::Lookup { id, filters } => {
                assert!(id.is_none());
                assert_eq!(filters.len(), 2);
                assert_eq!(filters[1].0, "tag:team");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_import_and_global_flags() {
        let cli = Cli::try_parse_from([
            "tgwc",
            "import",
            "peer",
            "edge-peer",
            "tgw-connect-peer-1",
            "--output",
            "json",
            "--log-json",
        ])
        .unwrap();

        assert!(cli.log_json);
        assert!(matches!(cli.output, OutputFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::Import { kind: ResourceKindArg::Peer, ref name, .. } if name == "edge-peer"
        ));
    }

    #[test]
    fn test_schema_kind_names() {
        let cli = Cli::try_parse_from(["tgwc", "schema", "attachment-lookup"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Schema { kind: SchemaKind::AttachmentLookup }
        ));
    }
}
