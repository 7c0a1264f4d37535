//! scriptgather - collects inline and external script sources from page loads.
//!
//! CLI entry point.

use clap::Parser;
use scriptgather::{CollectConfig, Commands, Config, Gatherer, SetupConfig};
use std::fs;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let filter = if config.verbose {
        EnvFilter::new("scriptgather=debug,info")
    } else {
        EnvFilter::new("scriptgather=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let run = async {
        match config.command.clone() {
            Commands::Collect(collect_config) => run_collect(collect_config, config.verbose).await,
            Commands::Setup(setup_config) => run_setup(setup_config).await,
        }
    };

    // Dropping `run` drops any live browser, which kills its Chrome process.
    let outcome = tokio::select! {
        outcome = run => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted, shutting down browser...");
            return ExitCode::from(130);
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}

async fn run_collect(collect_config: CollectConfig, verbose: bool) -> Result<(), ExitCode> {
    let targets = match collect_config.load_targets() {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to load targets: {}", e);
            return Err(ExitCode::FAILURE);
        }
    };

    if targets.is_empty() {
        error!("No targets specified. Use positional arguments or -f <file>.");
        return Err(ExitCode::FAILURE);
    }

    let gatherer = Gatherer::new(&collect_config, verbose);
    let results = gatherer.gather_multiple(&targets).await;

    if collect_config.json || collect_config.output.is_some() {
        let json = match serde_json::to_string_pretty(&results) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize results: {}", e);
                return Err(ExitCode::FAILURE);
            }
        };

        if let Some(ref output_path) = collect_config.output {
            if let Err(e) = fs::write(output_path, &json) {
                error!("Failed to write output file: {}", e);
                return Err(ExitCode::FAILURE);
            }
            info!("Results written to: {:?}", output_path);
        } else {
            println!("{}", json);
        }
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        error!("{} of {} pages failed", failed, results.len());
        return Err(ExitCode::FAILURE);
    }

    Ok(())
}

async fn run_setup(setup_config: SetupConfig) -> Result<(), ExitCode> {
    eprintln!("Setting up Chromium browser...");
    match scriptgather::browser::download_chrome(setup_config.force).await {
        Ok(path) => {
            eprintln!("Chromium ready at: {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("Setup failed: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}
