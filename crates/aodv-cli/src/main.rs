//! aodv-sim binary
//!
//! Runs the reference scenario (or a JSON script) through the driver, or
//! starts the interactive console with `--mode cli`.

mod console;
mod options;
mod render;

use std::process::ExitCode;

use aodv_core::{scenario, Driver, DriverConfig};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console::Console;
use options::{Invocation, Mode, Options, USAGE};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Logs go to stderr so they never interleave with the console.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aodv_sim=info,aodv_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = match Invocation::parse(std::env::args().skip(1)) {
        Ok(Invocation::Run(options)) => options,
        Ok(Invocation::Help) => {
            println!("{USAGE}");
            return Ok(ExitCode::SUCCESS);
        }
        Ok(Invocation::Version) => {
            println!("aodv-sim {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            return Ok(ExitCode::from(2));
        }
    };

    let config = DriverConfig::from_env()?;
    match options.mode {
        Mode::Sim => simulate(&options, config).await?,
        Mode::Cli => {
            let mut console = Console::new(
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                config,
            );
            console.run().await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn simulate(options: &Options, config: DriverConfig) -> aodv_core::Result<()> {
    let script = match &options.script {
        Some(path) => scenario::load_script(path)?,
        None => scenario::reference_script(),
    };
    info!(events = script.len(), nodes = options.nodes.len(), "starting simulation");

    let mut driver = Driver::start(options.nodes.iter().copied(), config)?;
    let reports = driver.run_script(&script).await?;
    for report in &reports {
        for line in render::step_lines(report) {
            println!("{line}");
        }
    }

    println!("Final state:");
    for line in render::snapshot_lines(&driver.snapshots()) {
        println!("{line}");
    }

    driver.shutdown().await?;
    info!("simulation finished");
    Ok(())
}
