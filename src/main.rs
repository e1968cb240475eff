use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use futures_lite::StreamExt;
use roomba_oi::sensor::{BATTERY_CAPACITY, BATTERY_CHARGE, BUMPS_WHEEL_DROPS, CLIFF_FRONT_LEFT_SIGNAL, DISTANCE, VIRTUAL_WALL};
use roomba_oi::sim::{SimConfig, Simulator};
use roomba_oi::{ChecksumMode, DriverConfig, Roomba};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Runs a scripted Open Interface session against the built-in simulator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Optional JSON driver configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of stream frames to print before pausing.
    #[arg(short, long, default_value_t = 5)]
    frames: usize,
    /// Drive velocity in mm/s.
    #[arg(long, default_value_t = -200, allow_hyphen_values = true)]
    velocity: i16,
    /// Drive radius in mm.
    #[arg(long, default_value_t = 500, allow_hyphen_values = true)]
    radius: i16,
    /// Make the simulator include the 0x13 marker in frame checksums.
    #[arg(long)]
    include_marker: bool,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn setup_logging(verbosity: &Verbosity<InfoLevel>) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry().with(filter).with(console_layer).init();
}

fn load_config(cli: &Cli) -> Result<DriverConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            DriverConfig::from_json(&json).with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => DriverConfig::default(),
    };
    if cli.include_marker {
        config = config.with_checksum(ChecksumMode::IncludeMarker);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.verbose);
    let config = load_config(&cli)?;

    let sim_config = SimConfig {
        checksum: config.checksum,
        ..SimConfig::default()
    };
    let (sim, link) = Simulator::spawn(sim_config);
    let mut roomba = Roomba::with_config(link, config);

    roomba.control().await.context("Failed to take control")?;
    println!("Declared mode: {}", roomba.mode());

    roomba.drive(cli.velocity, cli.radius).await?;
    roomba.leds(false, true, false, false, 0, 128).await?;

    let ids = [BUMPS_WHEEL_DROPS, VIRTUAL_WALL, DISTANCE, BATTERY_CHARGE, BATTERY_CAPACITY];
    let payloads = roomba.query_list(&ids).await?;
    println!("Query list:");
    for (id, payload) in ids.iter().zip(&payloads) {
        println!("  packet {id:>3}: {}", hex::encode(payload));
    }

    let mut session = roomba.stream(&[CLIFF_FRONT_LEFT_SIGNAL, VIRTUAL_WALL]).await?;
    println!("Streaming {} byte frames:", session.frame_len());
    let mut shown = 0;
    while shown < cli.frames {
        match tokio::time::timeout(Duration::from_secs(1), session.next()).await {
            Ok(Some(Ok(frame))) => {
                shown += 1;
                for (id, reading) in frame.readings()? {
                    println!("  frame {shown}: packet {id} = {reading:?}");
                }
            }
            Ok(Some(Err(e))) => warn!(error = %e, "Stream frame rejected"),
            Ok(None) => break,
            Err(_) => {
                warn!("No stream frame within a second");
                break;
            }
        }
    }
    let discarded = session.close().await;
    info!(discarded, "Stream closed");

    let reported = roomba.query_mode().await?;
    println!("Device reports mode {reported}, declared {}", roomba.mode());

    roomba.stop().await?;
    println!("Simulator received {} bytes: {}", sim.received().len(), hex::encode(sim.received()));
    Ok(())
}
