//! Testplane CLI entry point.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use testplane::cli::commands;
use testplane::cli::{handle_error, Cli, Commands};
use testplane::infrastructure::config::ConfigLoader;
use testplane::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command, cli.json).await {
        Ok(code) => code,
        Err(err) => handle_error(err, cli.json),
    }
}

async fn run(command: Commands, json_mode: bool) -> Result<ExitCode> {
    let config = ConfigLoader::load()?;
    let _logger = LoggerImpl::init(&LogConfig::try_from(&config.logging)?)?;

    match command {
        Commands::Run { manifest, timeout } => {
            commands::run::execute(&manifest, timeout, &config.controller, json_mode).await
        }
        Commands::Check { manifest } => commands::check::execute(&manifest, json_mode),
        Commands::Config => {
            commands::config::execute(&config, json_mode)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
