// =============================================================================
// Watch Configuration — explicit settings struct for the pipeline
// =============================================================================
//
// Every tunable lives here and is passed into the pipeline entry point, so
// the core stays testable without environment mutation.  Persistence uses an
// atomic tmp + rename pattern to prevent corruption on crash, and all fields
// carry serde defaults so adding new fields never breaks loading an older
// config file.
//
// Notifier credentials are the one exception: they stay in the environment
// (`TELEGRAM_TOKEN`, `TELEGRAM_CHAT`, `DISCORD_WEBHOOK`) and never touch the
// config file on disk.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_timeframes() -> Vec<String> {
    vec![
        "3m".to_string(),
        "15m".to_string(),
        "1h".to_string(),
        "4h".to_string(),
        "1d".to_string(),
    ]
}

fn default_confirm_timeframes() -> Vec<String> {
    vec![
        "15m".to_string(),
        "1h".to_string(),
        "4h".to_string(),
        "1d".to_string(),
    ]
}

fn default_db_path() -> String {
    "data/candles.db".to_string()
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_threshold() -> f64 {
    30.0
}

fn default_batch_size() -> usize {
    500
}

fn default_fetch_limit() -> usize {
    500
}

fn default_loop_interval_secs() -> u64 {
    240
}

/// Which venue an instrument trades on (and therefore which source fetches
/// it and whether the equity session gate applies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentKind {
    Crypto,
    Equity,
}

/// One tracked instrument.
#[derive(Debug, Clone)]
pub struct Instrument {
    pub symbol: String,
    pub kind: InstrumentKind,
}

// =============================================================================
// WatchConfig
// =============================================================================

/// Top-level configuration for a watch run.
///
/// Every field has a serde default so older JSON files missing new fields
/// still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Crypto pairs fetched from Binance (exchange notation, e.g. BTCUSDT).
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Equity tickers fetched from Yahoo (e.g. AAPL).  Empty by default.
    #[serde(default)]
    pub equities: Vec<String>,

    /// Timeframes ingested per instrument.  Must all come from the fixed
    /// duration table; validated at startup.
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<String>,

    /// Confirmation timeframes for the multi-timeframe RSI rule.
    #[serde(default = "default_confirm_timeframes")]
    pub confirm_timeframes: Vec<String>,

    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// RSI look-back period.
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Oversold threshold for both alert rules.
    #[serde(default = "default_rsi_threshold")]
    pub rsi_threshold: f64,

    /// Records per store transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum rows per fetch request.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// Run forever with a fixed sleep between passes instead of exiting
    /// after one pass.  The primary deployment model is an external
    /// scheduler invoking single passes; this is the optional mode.
    #[serde(default)]
    pub loop_enabled: bool,

    /// Sleep between passes when looping.
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            equities: Vec::new(),
            timeframes: default_timeframes(),
            confirm_timeframes: default_confirm_timeframes(),
            db_path: default_db_path(),
            rsi_period: default_rsi_period(),
            rsi_threshold: default_rsi_threshold(),
            batch_size: default_batch_size(),
            fetch_limit: default_fetch_limit(),
            loop_enabled: false,
            loop_interval_secs: default_loop_interval_secs(),
        }
    }
}

impl WatchConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read watch config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse watch config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            equities = ?config.equities,
            timeframes = ?config.timeframes,
            "watch config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise watch config")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "watch config saved (atomic)");
        Ok(())
    }

    /// Every tracked instrument, crypto first, in config order.
    pub fn instruments(&self) -> Vec<Instrument> {
        let crypto = self.symbols.iter().map(|s| Instrument {
            symbol: s.clone(),
            kind: InstrumentKind::Crypto,
        });
        let equities = self.equities.iter().map(|s| Instrument {
            symbol: s.clone(),
            kind: InstrumentKind::Equity,
        });
        crypto.chain(equities).collect()
    }
}
