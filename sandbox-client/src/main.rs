//! Sandbox streaming client: entry point.
//!
//! ```text
//! sandbox-client                     Stream with defaults
//! sandbox-client --config <path>    Use custom config TOML
//! sandbox-client --service <addr>   Override the service address
//! sandbox-client --ticks 600        Stop after 600 ticks
//! sandbox-client --dump out.png     Save the last processed frame
//! sandbox-client --gen-config       Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sandbox_core::{ExchangeScheduler, ExchangeStats, HttpExchange, TickOutcome};

use sandbox_client::config::ClientConfig;
use sandbox_client::sink::RecordingSink;
use sandbox_client::surface::ProceduralSurface;

/// How long to wait for the last exchange on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sandbox-client", about = "Stream height fields to a sandbox processing service")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "sandbox-client.toml")]
    config: PathBuf,

    /// Service address (overrides config). Example: 127.0.0.1:5000
    #[arg(short, long)]
    service: Option<String>,

    /// Stop after this many ticks.
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Write the last processed frame to this PNG on exit.
    #[arg(short, long)]
    dump: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(addr) = cli.service {
        config.service.address = addr;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::File::create(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }

    info!("sandbox-client v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "surface: {}x{} @ {} Hz",
        config.surface.width, config.surface.height, config.stream.tick_hz
    );

    // ── 1. Build the pipeline ───────────────────────────────────

    let exchange = HttpExchange::new(config.exchange(), tokio::runtime::Handle::current());
    let mut scheduler = ExchangeScheduler::with_config(exchange, config.scheduler());
    let service = scheduler.exchange().config();
    info!(
        "service: http://{}{} (timeout {:?})",
        service.address, service.path, service.timeout
    );
    info!("recovery policy: {:?}", scheduler.recovery());

    let mut surface = ProceduralSurface::new(config.surface.width, config.surface.height);
    let mut sink = RecordingSink::new();

    // Ctrl-C handler.
    let running = Arc::new(AtomicBool::new(true));
    let stop = running.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    // ── 2. Tick loop ────────────────────────────────────────────

    let period = config.tick_period();
    let stats_every = Duration::from_millis(config.stream.stats_interval_ms);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ticks: u64 = 0;
    let mut last_stats = Instant::now();

    while running.load(Ordering::SeqCst) && cli.ticks.is_none_or(|limit| ticks < limit) {
        interval.tick().await;
        surface.advance(period.as_secs_f32());

        match scheduler.tick(&surface, &mut sink) {
            TickOutcome::Skipped(e) => warn!("tick {ticks}: capture skipped: {e}"),
            TickOutcome::Stalled => {
                // Nothing resumes the loop from here.
                warn!("exchange loop stalled; stopping");
                break;
            }
            _ => {}
        }
        ticks += 1;

        if !stats_every.is_zero() && last_stats.elapsed() >= stats_every {
            log_stats(&scheduler.stats());
            last_stats = Instant::now();
        }
    }

    // ── 3. Shutdown ─────────────────────────────────────────────

    info!("stopping after {ticks} ticks");
    let stats = scheduler.drain(DRAIN_TIMEOUT, &mut sink).await;
    log_stats(&stats);

    if let Some(path) = cli.dump {
        if sink.save_png(&path)? {
            info!("saved last frame to {}", path.display());
        } else {
            warn!("no frame was published; nothing written to {}", path.display());
        }
    }

    Ok(())
}

fn log_stats(stats: &ExchangeStats) {
    info!(
        "sent {} | published {} | dropped {} | skipped {} | rtt {:.1} ms (last {:.1}) | {:.1} ex/s | {} B/s | reallocs {}",
        stats.frames_sent,
        stats.frames_published,
        stats.frames_dropped,
        stats.frames_skipped,
        stats.smoothed_rtt.as_secs_f64() * 1000.0,
        stats.last_rtt.as_secs_f64() * 1000.0,
        stats.exchanges_per_sec,
        stats.throughput_bps,
        stats.reallocations,
    );
}
