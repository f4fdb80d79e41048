//! RTP Queue Simulator - lossy link replay
//!
//! Sends a synthetic video stream over a simulated lossy link into an RTP
//! receive queue and prints the resulting receiver statistics.

use clap::Parser;
use rtp_queue_sim::{display_report, SimConfig, Simulation};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rtpq-sim")]
#[command(about = "RTP receive queue simulator", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of packets to send
    #[arg(short, long)]
    packets: Option<u64>,

    /// Packet loss probability (0.0 to 1.0)
    #[arg(short, long)]
    loss: Option<f64>,

    /// Random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging, RUST_LOG overrides the default level
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            SimConfig::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load '{}': {}", path.display(), e))?
        }
        None => SimConfig::example(),
    };

    if let Some(packets) = args.packets {
        config.link.packets = packets;
    }
    if let Some(loss) = args.loss {
        config.link.loss = loss;
    }
    if let Some(seed) = args.seed {
        config.link.seed = seed;
    }

    if let Err(e) = config.validate() {
        anyhow::bail!("{}", e);
    }

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let clock_rate = config.queue.clock_rate;
    let report = Simulation::new(config)?.run()?;

    tracing::info!(
        "Delivered {} frames in {:?} of simulated time",
        report.frames_delivered,
        report.duration
    );
    display_report(&report, clock_rate);

    Ok(())
}
