use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;

use cli::{Cli, Command};
use config::FileConfig;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let level = if cli.verbose { "deskpatch=debug" } else { "deskpatch=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let file_config = FileConfig::load_or_default(cli.config.as_deref())?;
    debug!("Effective file config: {:?}", file_config);
    let patcher = commands::build_patcher(&cli, &file_config)?;

    match cli.command {
        Command::Patch => commands::patch::run(&patcher),
        Command::Unpatch => commands::unpatch::run(&patcher),
        Command::Status => commands::status::run(&patcher),
    }
}

fn report_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "error:".red().bold(), err);
    if let Some(err) = err.downcast_ref::<deskpatch::Error>() {
        eprintln!("{} {}", "hint:".yellow().bold(), err.hint());
        if let Some(next) = commands::next_command(err) {
            eprintln!("{} {}", "next:".cyan().bold(), next);
        }
    }
}
