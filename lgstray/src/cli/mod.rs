mod probe;
mod watch;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lgstray_hidpp::{bus::DeviceBus, interface};
use probe::ProbeCommand;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watch::WatchCommand;

use crate::config::Settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    color: colorchoice_clap::Color,

    #[command(subcommand)]
    command: Commands,

    /// Output plain JSON without color and interactivity
    #[arg(short, long, global = true)]
    json: bool,

    /// Read settings from a TOML file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log more details to stderr, repeat for even more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    Probe(ProbeCommand),
    Watch(WatchCommand),
}

pub async fn execute() -> Result<()> {
    let cli = Cli::parse();

    cli.color.write_global();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Probe(cmd) => cmd.execute(&cli, &settings).await,
        Commands::Watch(cmd) => cmd.execute(&cli, &settings).await,
    }
}

/// Installs the log subscriber. `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lgstray={level},lgstray_hidpp={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Opens the configured receiver and discovers its devices.
async fn start_bus(settings: &Settings) -> Result<Arc<DeviceBus>> {
    let (short, long) = interface::open_receiver(settings.vendor_id, &settings.product_ids)
        .context("could not open the receiver")?;

    let bus = DeviceBus::start(Box::new(short), Box::new(long), settings.bus_config())
        .await
        .context("could not set up the receiver")?;
    info!(devices = bus.sessions().len(), "receiver is set up");

    Ok(Arc::new(bus))
}
