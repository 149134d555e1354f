// src/cli.rs

//! CLI argument parsing using `clap` (derive feature).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `helmdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "helmdag",
    version,
    about = "Install graphs of Helm charts in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HELMDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Install (or upgrade) a graph of charts described by a YAML file.
    Install(InstallArgs),
    /// Validate a file and print the install plan without executing it.
    Plan(PlanArgs),
}

#[derive(Debug, Clone, Args)]
pub struct InstallArgs {
    /// Kubernetes namespace into which to install charts.
    #[arg(long = "k8s-namespace", value_name = "NS")]
    pub k8s_namespace: Option<String>,

    /// kubeconfig context to use.
    #[arg(long = "k8s-ctx", value_name = "CTX")]
    pub k8s_ctx: Option<String>,

    /// Prefix prepended to every release name.
    #[arg(long, value_name = "PREFIX")]
    pub release_name_prefix: Option<String>,

    /// Upgrade releases instead of installing them.
    #[arg(long)]
    pub upgrade: bool,

    /// Global deadline for the whole run (e.g. "30m"). Unbounded if omitted.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Log lines fetched per failed container for diagnostics (0 = full log).
    #[arg(long, value_name = "N", default_value_t = 500)]
    pub max_log_lines: i64,

    /// Path to the YAML chart definitions file.
    pub file: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Emit Graphviz DOT instead of textual phases.
    #[arg(short = 'g', long = "graphviz")]
    pub graphviz: bool,

    /// Path to the YAML chart definitions file.
    pub file: PathBuf,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
