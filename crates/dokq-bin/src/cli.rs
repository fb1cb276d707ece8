// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand, ValueEnum};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// DokQ healthcare platform API server.
#[derive(Parser, Debug)]
#[command(
    name = "dokq",
    author = "Sylvex <contact@sylvex.io>",
    version = dokq_api::VERSION,
    about = "DokQ healthcare platform API server",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "info",
        env = "DOKQ_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "DOKQ_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the API server
    ///
    /// This is the default command when no subcommand is specified.
    Run,

    /// Validate the environment configuration without serving
    ///
    /// Checks the signing secret, verifier selection, and origin policy, then
    /// exits. Useful before deployment.
    Validate,

    /// Show version information
    Version,
}

// =============================================================================
// Log Format
// =============================================================================

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for log aggregation.
    Json,
    /// Minimal compact output.
    Compact,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["dokq"]);
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_subcommands() {
        let cli = Cli::parse_from(["dokq", "validate"]);
        assert!(matches!(cli.command, Some(Commands::Validate)));

        let cli = Cli::parse_from(["dokq", "--log-format", "json", "run"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Some(Commands::Run)));
    }
}
