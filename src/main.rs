// =============================================================================
// Candlewatch — Main Entry Point
// =============================================================================
//
// Periodically fetches OHLCV candles for tracked crypto pairs and equities,
// persists them into a local SQLite store, and emits deduplicated oversold
// alerts over Telegram / Discord.  The primary deployment model is a single
// pass driven by an external scheduler; set `loop_enabled` (or LOOP=1) to
// run forever with a fixed sleep instead.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alert;
mod config;
mod error;
mod indicators;
mod ingest;
mod notify;
mod pipeline;
mod schedule;
mod sources;
mod store;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::WatchConfig;
use crate::notify::Dispatcher;
use crate::pipeline::Pipeline;
use crate::sources::{BinanceSource, YahooSource};
use crate::store::CandleStore;

const CONFIG_PATH: &str = "candlewatch.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = WatchConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        WatchConfig::default()
    });

    // Override tracked symbols from env if available.
    if let Ok(syms) = std::env::var("CANDLEWATCH_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    // LOOP=1 turns on the optional loop-with-sleep mode.
    if let Ok(flag) = std::env::var("LOOP") {
        config.loop_enabled = matches!(flag.trim(), "1" | "true" | "TRUE");
    }

    info!(
        symbols = ?config.symbols,
        equities = ?config.equities,
        timeframes = ?config.timeframes,
        loop_enabled = config.loop_enabled,
        "candlewatch starting"
    );

    // ── 2. Wire collaborators ────────────────────────────────────────────
    let store = CandleStore::open(&config.db_path)?;

    let dispatcher = Dispatcher::from_env();
    if dispatcher.is_empty() {
        warn!("no notification channels configured — alerts will only be logged");
    }

    let mut pipeline = Pipeline::new(
        config,
        store,
        Box::new(BinanceSource::new()),
        Box::new(YahooSource::new()),
        dispatcher,
    );

    // ── 3. Run ───────────────────────────────────────────────────────────
    tokio::select! {
        result = pipeline.run() => {
            result?;
            info!("run complete");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received — stopping");
        }
    }

    Ok(())
}
