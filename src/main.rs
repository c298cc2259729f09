//! Tally CLI: incremental CSV loader with grouped-count snapshots.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally::{Config, Pipeline, TriggerMode, shutdown_signal};

#[derive(Parser)]
#[command(name = "tally", about = "Incremental CSV loader with grouped-count snapshots")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline (once or continuously, per config).
    Run {
        /// Path to the YAML config file.
        #[arg(long)]
        config: String,
        /// Force a single run-once trigger regardless of config.
        #[arg(long)]
        once: bool,
    },
    /// Drop the target table, checkpoints, and inferred schema.
    Cleanup {
        /// Path to the YAML config file.
        #[arg(long)]
        config: String,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();
    match args.command {
        Command::Run { config, once } => run(&config, once).await,
        Command::Cleanup { config } => cleanup(&config).await,
    }
}

async fn run(config_path: &str, once: bool) -> ExitCode {
    let mut config = match Config::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if once {
        config.trigger.mode = TriggerMode::Once;
    }

    info!(
        stream = %config.stream,
        source = %config.source.path,
        table = %config.sink.table_uri,
        mode = ?config.trigger.mode,
        "Starting tally"
    );

    match config.trigger.mode {
        TriggerMode::Once => match Pipeline::new(config).run_once().await {
            Ok(summary) => {
                info!(
                    files = summary.files,
                    records = summary.records,
                    rescued = summary.rescued,
                    groups = summary.groups,
                    "Run-once trigger complete"
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Pipeline failed: {e}");
                ExitCode::FAILURE
            }
        },
        TriggerMode::Continuous => {
            let handle = Pipeline::new(config).start();

            shutdown_signal().await;
            info!("Shutting down");

            match handle.stop_and_wait().await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Pipeline failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn cleanup(config_path: &str) -> ExitCode {
    let config = match Config::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match Pipeline::cleanup(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Cleanup failed: {e}");
            ExitCode::FAILURE
        }
    }
}
