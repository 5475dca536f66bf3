//! `narwal`: drive a Narwal robot vacuum over its local WebSocket.

mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use narwal_core::Vacuum;

use crate::cli::{Cli, ColorMode, Command, GlobalOpts};
use crate::error::CliError;

/// Crates whose logs follow `-v`. Everything else (tungstenite, tokio)
/// stays at `warn` unless `RUST_LOG` says otherwise.
const LOG_TARGETS: [&str; 4] = ["narwal", "narwal_core", "narwal_api", "narwal_config"];

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.global);
    init_report_colors(cli.global.color);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = u8::try_from(err.exit_code()).unwrap_or(1);
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code)
        }
    }
}

fn init_tracing(global: &GlobalOpts) {
    let level = match (global.quiet, global.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect();
        EnvFilter::new(format!("warn,{}", directives.join(",")))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(global.verbose > 2)
        .with_writer(std::io::stderr)
        .init();
}

/// `--color always|never` also governs error reports; `auto` keeps miette's
/// own terminal detection.
fn init_report_colors(mode: ColorMode) {
    let color = match mode {
        ColorMode::Auto => return,
        ColorMode::Always => true,
        ColorMode::Never => false,
    };
    let installed = miette::set_hook(Box::new(move |_| {
        Box::new(miette::MietteHandlerOpts::new().color(color).build())
    }));
    if installed.is_err() {
        tracing::debug!("Report handler already installed");
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let Cli { global, command } = cli;
    match command {
        Command::Config(args) => commands::config_cmd::handle(args, &global),

        Command::Completions(args) => {
            clap_complete::generate(
                args.shell,
                &mut Cli::command(),
                "narwal",
                &mut std::io::stdout(),
            );
            Ok(())
        }

        command => {
            let session_config = config::resolve_session_config(&global)?;
            tracing::debug!(
                endpoint = %session_config.endpoint(),
                command = ?command,
                "Dispatching to robot"
            );
            let vacuum = Vacuum::new(session_config)?;
            commands::dispatch(command, &vacuum, &global).await
        }
    }
}
