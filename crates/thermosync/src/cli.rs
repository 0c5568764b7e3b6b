//! Clap derive structures for the `thermosync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// thermosync -- poll heating controllers and publish zone snapshots
#[derive(Debug, Parser)]
#[command(
    name = "thermosync",
    version,
    about = "Poll heating controllers and publish validated zone snapshots",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "THERMOSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase console verbosity (-v debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors to the console
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate the configuration without contacting any device
    Check,

    /// Run one update cycle per device and print the results as JSON
    Poll(PollArgs),

    /// Poll continuously, printing every published snapshot as a JSON line
    Run,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct PollArgs {
    /// Only poll this device (config table name)
    pub device: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}
