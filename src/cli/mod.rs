//! Command-line interface.

pub mod commands;
pub mod output;
pub mod table;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "testplane")]
#[command(about = "Testplane - test orchestration control plane", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a manifest until its test cases and workers settle
    Run {
        /// Manifest describing the suite, test cases and workers
        #[arg(short, long)]
        manifest: PathBuf,

        /// Give up after this long (e.g. 90s, 10m)
        #[arg(short, long, default_value = "10m", value_parser = humantime::parse_duration)]
        timeout: Duration,
    },

    /// Resolve every strategy in a manifest without running anything
    Check {
        /// Manifest to check
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Print an error with its cause chain and return the failure exit code.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ExitCode {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": causes,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    ExitCode::FAILURE
}
