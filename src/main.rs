use std::process::ExitCode;

use clap::Parser as _;

use evalgate::cli::Args;
use evalgate::config::Config;
use evalgate::errors::EvalError;
use evalgate::{evalgate_tracing, evaluation, workflow};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = evalgate_tracing::init() {
        eprintln!("failed to initialize tracing: {error}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(&args.config_path) {
        Ok(config) => config,
        Err(error) => return fail(&error),
    };

    if args.print_config {
        println!("{config:#?}");
        return ExitCode::SUCCESS;
    }

    match evaluation::run(&config, args.dry_run).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => fail(&error),
    }
}

/// One annotation, one log line, exit 1. Comment failures never reach here.
fn fail(error: &EvalError) -> ExitCode {
    workflow::error(error);
    tracing::error!(%error, "evaluation run failed");

    ExitCode::FAILURE
}
