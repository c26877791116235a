//! ==============================================================================
//! main.rs - thermolog daemon entry point
//! ==============================================================================
//!
//! purpose:
//!     samples the serial temperature sensor on a fixed interval and keeps the
//!     raw/hourly/daily tier files up to date until interrupted.
//!
//! responsibilities:
//!     - parse the command line (-c/--config, -a/--accelerate, -h, -v)
//!     - load + validate configuration, install the log subscriber
//!     - open the serial port and restore tier history (fatal on failure)
//!     - run the measurement loop until ctrl-c, then shut down gracefully
//!
//! relationships:
//!     - uses: config.rs, logging.rs, processor.rs, service.rs
//!
//! ==============================================================================

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use thermolog::config::ServiceConfig;
use thermolog::logging;
use thermolog::processor::ReadingProcessor;
use thermolog::service::Service;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// blocked serial reads cannot be cancelled; don't wait on them forever at exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ==============================================================================
// command line
// ==============================================================================

#[derive(Debug, PartialEq)]
enum Command {
    Run(Options),
    Help,
    Version,
}

#[derive(Debug, PartialEq)]
struct Options {
    config: PathBuf,
    accelerate: Option<f64>,
}

fn usage() -> String {
    format!(
        "thermolog {VERSION}\n\
         \n\
         usage: thermolog -c <CONFIG> [-a <MULTIPLIER>]\n\
         \n\
         options:\n  \
           -c, --config <PATH>        configuration file (.toml or .json)\n  \
           -a, --accelerate <FACTOR>  timestamp readings at FACTOR x real time\n  \
           -h, --help                 print this help\n  \
           -v, --version              print the version"
    )
}

fn parse_args<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut config = None;
    let mut accelerate = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-c" | "--config" => {
                let path = args.next().ok_or_else(|| format!("{arg} requires a path"))?;
                config = Some(PathBuf::from(path));
            }
            "-a" | "--accelerate" => {
                let value = args.next().ok_or_else(|| format!("{arg} requires a multiplier"))?;
                let factor = value
                    .parse::<f64>()
                    .map_err(|_| format!("invalid multiplier {value:?}"))?;
                accelerate = Some(factor);
            }
            other => return Err(format!("unexpected argument {other:?}")),
        }
    }

    let config = config.ok_or_else(|| "missing required --config <PATH>".to_string())?;
    Ok(Command::Run(Options { config, accelerate }))
}

// ==============================================================================
// main entry point
// ==============================================================================

fn main() -> ExitCode {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            println!("{}", usage());
            return ExitCode::SUCCESS;
        }
        Ok(Command::Version) => {
            println!("thermolog {VERSION}");
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("error: {message}\n\n{}", usage());
            return ExitCode::FAILURE;
        }
    };

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: Options) -> Result<()> {
    // step 1: configuration + logging
    let config = ServiceConfig::load(&options.config)
        .with_context(|| format!("loading {}", options.config.display()))?;
    logging::init(&config.logging).context("installing log subscriber")?;
    tracing::info!(version = VERSION, "thermolog starting");
    config.summary();

    // step 2: reading processor
    let processor = match options.accelerate {
        Some(multiplier) => {
            tracing::info!(multiplier, "time acceleration enabled");
            ReadingProcessor::accelerated(chrono::Utc::now(), multiplier)
                .context("invalid --accelerate value")?
        }
        None => ReadingProcessor::realtime(),
    };

    // step 3: runtime + service
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let result = runtime.block_on(async {
        let mut service = Service::new(&config, processor).context("starting service")?;
        service.start();

        tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
        tracing::info!("shutdown requested");
        service.stop().await;
        Ok::<_, anyhow::Error>(())
    });

    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn config_is_required() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["-a", "60"])).is_err());
        assert!(parse_args(args(&["--config"])).is_err());
    }

    #[test]
    fn short_and_long_options() {
        let expected = Command::Run(Options {
            config: PathBuf::from("thermolog.toml"),
            accelerate: Some(60.0),
        });
        assert_eq!(parse_args(args(&["-c", "thermolog.toml", "-a", "60"])), Ok(expected));

        let expected = Command::Run(Options { config: PathBuf::from("lab.json"), accelerate: None });
        assert_eq!(parse_args(args(&["--config", "lab.json"])), Ok(expected));
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(parse_args(args(&["-c", "x.toml", "--help"])), Ok(Command::Help));
        assert_eq!(parse_args(args(&["-v"])), Ok(Command::Version));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse_args(args(&["-c", "x.toml", "-a", "fast"])).is_err());
        assert!(parse_args(args(&["-c", "x.toml", "--verbose"])).is_err());
    }
}
