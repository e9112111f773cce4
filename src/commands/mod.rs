use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::app::{AppController, ControllerOptions};
use crate::domain::ScoreTransport;

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "pronscore",
    version,
    about = "Score a spoken recording against its target text with a remote pronunciation engine"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Directory holding config.toml (defaults to the OS config directory).
    #[arg(global = true, long)]
    pub config_dir: Option<PathBuf>,
    /// Override the engine base URL.
    #[arg(global = true, long)]
    pub engine_url: Option<String>,
    /// Increase logging verbosity (-v, -vv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Evaluate one recording and print the result as JSON.
    Evaluate(EvaluateArgs),
    /// Print the effective configuration and where it lives.
    Config,
}

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// Target word or sentence.
    #[arg(long)]
    pub text: String,
    /// Recording in any format the transcoder understands.
    #[arg(long)]
    pub audio: PathBuf,
    /// How the score stage uploads audio.
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,
    /// Abandon the run after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TransportArg {
    Json,
    File,
}

impl From<TransportArg> for ScoreTransport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Json => ScoreTransport::Json,
            TransportArg::File => ScoreTransport::File,
        }
    }
}

/// Paths and settings reported by `pronscore config`.
#[derive(Serialize)]
struct ConfigReport {
    config_path: Option<String>,
    data_dir: Option<String>,
    logs_dir: Option<String>,
    config: crate::domain::AppConfig,
}

fn log_level(verbose: u8) -> Option<String> {
    match verbose {
        0 => None,
        1 => Some("debug".to_string()),
        _ => Some("trace".to_string()),
    }
}

fn controller_options(cli: &Cli) -> ControllerOptions {
    let mut options = ControllerOptions {
        data_dir: cli.config_dir.clone(),
        engine_url: cli.engine_url.clone(),
        log_level: log_level(cli.verbose),
        ..ControllerOptions::default()
    };
    if let Commands::Evaluate(args) = &cli.command {
        options.score_transport = args.transport.map(Into::into);
        options.run_timeout_secs = args.timeout_secs;
    }
    options
}

/// Run the parsed command. The exit code reflects whether an evaluation succeeded.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let controller = AppController::new(controller_options(&cli))
        .context("failed to initialize PronScore")?;

    match &cli.command {
        Commands::Evaluate(args) => {
            let result = controller
                .evaluate_file(&args.text, &args.audio)
                .await
                .context("evaluation did not complete")?;

            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Config => {
            let report = ConfigReport {
                config_path: controller.config_path(),
                data_dir: controller.data_dir(),
                logs_dir: controller.logs_dir(),
                config: controller.config().clone(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
