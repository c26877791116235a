//! ==============================================================================
//! simulator.rs - serial sensor simulator (thermolog-sim)
//! ==============================================================================
//!
//! purpose:
//!     pretends to be the temperature sensor: writes one reading per line to
//!     a serial port every 50ms, following the synthetic waveform in
//!     `thermolog::simulator`. pair it with a null-modem cable or a pty pair
//!     (socat) to drive the daemon without hardware.
//!
//! usage:
//!     thermolog-sim <PORT> <BAUD_RATE> [MULTIPLIER=1.0]
//!
//! exit codes:
//!     1 = bad arguments, 2 = runtime failure (port, write)
//!
//! ==============================================================================

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::time::Duration;
use thermolog::simulator::TemperatureModel;
use thermolog::transport::{BaudRate, LineTransport, SerialBackend};
use tokio::time::MissedTickBehavior;

const WRITE_PERIOD: Duration = Duration::from_millis(50);

struct Args {
    port: String,
    baud: BaudRate,
    multiplier: f64,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let (port, baud, multiplier) = match args {
        [port, baud] => (port, baud, None),
        [port, baud, multiplier] => (port, baud, Some(multiplier)),
        _ => return Err("expected <PORT> <BAUD_RATE> [MULTIPLIER]".to_string()),
    };

    let baud = baud
        .parse::<u32>()
        .map_err(|_| format!("invalid baud rate {baud:?}"))
        .and_then(|rate| BaudRate::try_from(rate).map_err(|e| e.to_string()))?;

    let multiplier = match multiplier {
        Some(m) => m.parse::<f64>().map_err(|_| format!("invalid multiplier {m:?}"))?,
        None => 1.0,
    };
    if !(multiplier.is_finite() && multiplier >= 0.0) {
        return Err(format!("multiplier {multiplier} must be a finite value >= 0"));
    }

    Ok(Args { port: port.clone(), baud, multiplier })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("usage: thermolog-sim <PORT> <BAUD_RATE> [MULTIPLIER=1.0]");
            return ExitCode::from(1);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let backend = open_backend(&args)?;
    let mut transport = LineTransport::new(backend);
    transport.open().with_context(|| format!("opening {}", args.port))?;

    let model = TemperatureModel::new(20.0, 15.0, 1.0).with_multiplier(args.multiplier);
    tracing::info!(port = %args.port, baud = args.baud.as_u32(), multiplier = args.multiplier, "simulator running");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(WRITE_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        let temperature = model.temperature_at(chrono::Utc::now());
        transport
            .write(format!("{temperature}\n").as_bytes())
            .with_context(|| format!("writing to {}", args.port))?;
        tracing::debug!(temperature, "sent");
    }

    transport.close();
    Ok(())
}

// ==============================================================================
// backend selection
// ==============================================================================

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_backend(args: &Args) -> Result<Box<dyn SerialBackend>> {
    let backend = thermolog::transport::UartBackend::new(&args.port, args.baud.as_u32(), None);
    Ok(Box::new(backend))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_backend(_args: &Args) -> Result<Box<dyn SerialBackend>> {
    anyhow::bail!("built without the `hardware` feature: no serial backend available")
}
