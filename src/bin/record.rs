//! `sounder-record`: thin CLI entry point that loads a `SounderConfig` from
//! a JSON file, starts the ingest-and-record pipeline against a deterministic
//! replay radio, and runs until Ctrl+C, mirroring `hdds-recording`'s
//! `hdds-record` binary shape.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use sounder::config::SounderConfig;
use sounder::lifecycle::SounderRuntime;
use sounder::radio::ReplayRadio;

#[derive(Parser, Debug)]
#[command(name = "sounder-record", about = "Capture and record a channel sounder run")]
struct Args {
    /// Path to a JSON rendering of a `SounderConfig`.
    #[arg(long)]
    config: PathBuf,

    /// Output directory for recorded trace segments.
    #[arg(long, default_value = "./trace")]
    output_dir: PathBuf,

    /// Logging level.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Interval, in seconds, between stats log lines.
    #[arg(long, default_value_t = 5)]
    stats_interval_secs: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    sounder::init_logging(level);

    let data = std::fs::read_to_string(&args.config)?;
    let mut config = SounderConfig::from_json(&data)?;

    let running = Arc::new(AtomicBool::new(true));
    let ctrlc_flag = running.clone();
    ctrlc::set_handler(move || {
        tracing::info!("signal received, stopping");
        ctrlc_flag.store(false, Ordering::SeqCst);
    })?;

    let total_antennas = config.total_antennas();
    let radio = Arc::new(ReplayRadio::new(total_antennas.max(1), config.phy.samps_per_symbol()));

    let available_cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();

    tracing::info!(total_antennas, available_cores, "starting sounder runtime");
    let mut runtime = SounderRuntime::start(&mut config, radio, &args.output_dir, &timestamp, available_cores)?;

    if runtime.is_beam_sweep_only() {
        tracing::info!("beam-sweep-only run, no receive/record pools to poll for stats");
    }

    let mut elapsed = Duration::ZERO;
    let poll = Duration::from_millis(20);
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(poll);
        elapsed += poll;
        if elapsed.as_secs() >= args.stats_interval_secs {
            elapsed = Duration::ZERO;
            if let (Some(queue), Some(ring)) = (runtime.dispatch_queue(), runtime.ring()) {
                tracing::info!(dispatch_queue_len = queue.len(), ring_owned = ring.owned_count(), "stats");
            }
        }
    }

    tracing::info!("draining and shutting down");
    runtime.shutdown()?;
    tracing::info!("shutdown complete");

    Ok(())
}
