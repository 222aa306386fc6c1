//! Request coalescer command-line front end

use std::process::ExitCode;

use clap::Parser;
use futures::future::join_all;
use tracing::{error, info};

use request_coalescer::{
    ApiService,
    cli::{Cli, Command, FetchArgs},
    config::Config,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Fetch(args) => run_fetch(&config, &args).await,
    }
}

/// Run the `fetch` subcommand
async fn run_fetch(config: &Config, args: &FetchArgs) -> ExitCode {
    let description = match args.description() {
        Ok(description) => description,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let service = match ApiService::from_config(config) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to create service: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        url = %description.url,
        concurrency = args.concurrency,
        forced = description.force_request,
        "Issuing requests"
    );

    let pending: Vec<_> = (0..args.concurrency.max(1))
        .map(|_| service.request_value(description.clone()))
        .collect();

    let mut failed = false;
    for (i, result) in join_all(pending).await.into_iter().enumerate() {
        match result {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(json) => println!("#{i}: {json}"),
                Err(e) => {
                    eprintln!("#{i}: ❌ Failed to serialize response: {e}");
                    failed = true;
                }
            },
            Err(e) => {
                eprintln!("#{i}: ❌ {e}");
                failed = true;
            }
        }
    }

    if let Ok(stats) = serde_json::to_string_pretty(&service.stats()) {
        println!("\n{stats}");
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
