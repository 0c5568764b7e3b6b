mod cli;
mod commands;
mod error;

use clap::Parser;

use thermosync_config::Config;
use thermosync_core::{LogGuard, Severity};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Shell completions need no configuration
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "thermosync", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let config = load(&cli.global)?;
            let _guard = init_logging(&config, &cli.global);

            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &config).await
        }
    }
}

fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let config = match global.config {
        Some(ref path) => thermosync_config::load_config_file(path)?,
        None => thermosync_config::load_config()?,
    };
    Ok(config)
}

/// Install the configured sinks; `-v`/`-q` override the console threshold.
fn init_logging(config: &Config, global: &GlobalOpts) -> LogGuard {
    let guard = thermosync_core::logging::install(&config.logging);
    let console = match (global.quiet, global.verbose) {
        (true, _) => Some(Severity::Error),
        (false, 0) => None,
        (false, _) => Some(Severity::Debug),
    };
    if let Some(level) = console {
        guard.set_console_level(level);
    }
    guard
}
