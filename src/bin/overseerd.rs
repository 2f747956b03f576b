//! Demo binary (§6): a minimal, runnable front end for the supervisor core. Builds
//! `ServiceSpec`s from repeated `--service` flags, wires process-wide `SIGINT`/`SIGTERM` to
//! `shutdown_all()`, and logs every lifecycle event via `tracing`.

use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use overseer::{Command, LoggingError, ServiceSpec, SupervisorAggregator};
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// A service definition: `NAME=CMD[,ARG...]`. Repeatable.
    #[arg(long = "service", value_name = "NAME=CMD[,ARG...]", required = true)]
    services: Vec<String>,

    /// Graceful-stop timeout, in seconds, applied to every declared service.
    #[arg(long, default_value_t = 5)]
    stop_timeout: u64,

    /// Whether a service should be relaunched automatically after an unexpected exit.
    #[arg(long)]
    restart: bool,

    /// Maximum consecutive auto-restarts, only meaningful with `--restart`.
    #[arg(long, default_value_t = 0)]
    max_retries: u32,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("invalid --service value {0:?}: expected NAME=CMD[,ARG...]")]
    MalformedService(String),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error("one or more service specs failed validation:\n{0}")]
    Validation(String),
    #[error(transparent)]
    Aggregator(#[from] overseer::AggregatorError),
}

fn parse_service(raw: &str, stop_timeout: Duration, restart: bool, max_retries: u32) -> Result<ServiceSpec, CliError> {
    let (name, rest) = raw
        .split_once('=')
        .ok_or_else(|| CliError::MalformedService(raw.to_string()))?;
    if name.trim().is_empty() || rest.trim().is_empty() {
        return Err(CliError::MalformedService(raw.to_string()));
    }
    let command: Vec<String> = rest.split(',').map(str::to_string).collect();

    Ok(ServiceSpec::new(name, command)
        .with_stop_timeout(stop_timeout)
        .with_restart_on_exit(restart, max_retries))
}

fn run(cli: Cli) -> Result<(), CliError> {
    overseer::Logging::try_init()?;

    let stop_timeout = Duration::from_secs(cli.stop_timeout);
    let mut specs = Vec::with_capacity(cli.services.len());
    let mut malformed = Vec::new();
    for raw in &cli.services {
        match parse_service(raw, stop_timeout, cli.restart, cli.max_retries) {
            Ok(spec) => specs.push(spec),
            Err(err) => malformed.push(err.to_string()),
        }
    }
    if !malformed.is_empty() {
        return Err(CliError::Validation(malformed.join("\n")));
    }

    for spec in &specs {
        if let Err(errors) = spec.validate() {
            return Err(CliError::Validation(format!("{}: {:?}", spec.name, errors)));
        }
    }

    let service_names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
    let aggregator = SupervisorAggregator::build(specs, Arc::new(overseer::OsProcessLauncher))?;
    let aggregator = Arc::new(Mutex::new(aggregator));

    {
        let aggregator = aggregator.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutdown signal received");
            aggregator.lock().expect("aggregator lock poisoned").shutdown_all();
        })
        .expect("failed to install SIGINT/SIGTERM handler");
    }

    for name in &service_names {
        aggregator
            .lock()
            .expect("aggregator lock poisoned")
            .submit(name, Command::Start)
            .ok();
    }

    loop {
        let event = {
            let aggregator = aggregator.lock().expect("aggregator lock poisoned");
            aggregator.events().recv_timeout(Duration::from_millis(500))
        };
        match event {
            Ok(Some(event)) => {
                tracing::info!(service = %event.service_name, state = %event.state, "lifecycle event");
            }
            Ok(None) => continue,
            Err(_) => break,
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}
