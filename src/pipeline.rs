// =============================================================================
// Ingestion Pipeline — gate, fetch, normalize, upsert, then evaluate alerts
// =============================================================================
//
// One pass walks every tracked (instrument, timeframe) pair sequentially:
//
//   latest_open_time ──► gate (sentinel 0 bypasses) ──► fetch ──► normalize
//       ──► RSI attach ──► batched upsert
//
// Fault isolation is per pair: a fetch or normalization failure is logged, a
// best-effort failure notification goes out, and the pass continues with the
// next pair.  Store write failures are different — they propagate and abort
// the pass, because a silent partial write is worse than a crashed run the
// scheduler will retry.
//
// After ingestion, a single alert-evaluation pass runs over all pairs.
// =============================================================================

use tracing::{debug, info, warn};

use crate::alert::{AlertEvaluator, AlertRule};
use crate::config::{Instrument, InstrumentKind, WatchConfig};
use crate::error::{Result, WatchError};
use crate::ingest::{attach_rsi, normalize_batch};
use crate::notify::Dispatcher;
use crate::schedule;
use crate::sources::MarketData;
use crate::store::CandleStore;

/// Extra stored closes pulled in front of a batch so the RSI seed does not
/// restart from scratch on every incremental fetch.
const RSI_WARMUP_MARGIN: usize = 50;

/// Counters for one completed pass.
#[derive(Debug, Default, Clone)]
pub struct PassSummary {
    pub pairs_processed: usize,
    pub pairs_skipped: usize,
    pub candles_written: usize,
    pub fetch_failures: usize,
    pub alerts_sent: usize,
}

/// Wires the store, sources, notifier, and evaluator into the run loop.
pub struct Pipeline {
    config: WatchConfig,
    store: CandleStore,
    crypto_source: Box<dyn MarketData>,
    equity_source: Box<dyn MarketData>,
    dispatcher: Dispatcher,
    evaluator: AlertEvaluator,
}

impl Pipeline {
    pub fn new(
        config: WatchConfig,
        store: CandleStore,
        crypto_source: Box<dyn MarketData>,
        equity_source: Box<dyn MarketData>,
        dispatcher: Dispatcher,
    ) -> Self {
        let evaluator = AlertEvaluator::new(vec![
            AlertRule::RsiUnder {
                threshold: config.rsi_threshold,
            },
            AlertRule::RsiMultiTimeframe {
                timeframes: config.confirm_timeframes.clone(),
                threshold: config.rsi_threshold,
            },
        ]);

        Self {
            config,
            store,
            crypto_source,
            equity_source,
            dispatcher,
            evaluator,
        }
    }

    /// Reject configurations whose timeframes are outside the duration
    /// table before any network or store work happens.
    pub fn validate(&self) -> Result<()> {
        for tf in self
            .config
            .timeframes
            .iter()
            .chain(self.config.confirm_timeframes.iter())
        {
            schedule::timeframe_duration_ms(tf)?;
        }
        Ok(())
    }

    /// Run a single ingestion + alert pass.
    pub async fn run_pass(&mut self) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        let instruments = self.config.instruments();
        let timeframes = self.config.timeframes.clone();

        for instrument in &instruments {
            if instrument.kind == InstrumentKind::Equity && schedule::equity_market_closed() {
                debug!(symbol = %instrument.symbol, "equity market closed — skipped");
                summary.pairs_skipped += timeframes.len();
                continue;
            }

            for interval in &timeframes {
                match self.ingest_pair(instrument, interval).await {
                    Ok(Some(written)) => {
                        summary.pairs_processed += 1;
                        summary.candles_written += written;
                    }
                    Ok(None) => summary.pairs_skipped += 1,
                    // Store errors must propagate; everything else is a
                    // per-pair failure the pass survives.
                    Err(e @ WatchError::Store(_)) => return Err(e),
                    Err(e) => {
                        warn!(symbol = %instrument.symbol, interval = %interval,
                            error = %e, "pair ingestion failed — continuing");
                        self.dispatcher
                            .broadcast(&format!(
                                "candlewatch: failed to update {} {}: {e}",
                                instrument.symbol, interval
                            ))
                            .await;
                        summary.fetch_failures += 1;
                    }
                }
            }
        }

        // Alert pass runs once, after all ingestion for this pass is done.
        let pairs: Vec<(String, String)> = instruments
            .iter()
            .flat_map(|inst| {
                timeframes
                    .iter()
                    .map(|tf| (inst.symbol.clone(), tf.clone()))
            })
            .collect();
        summary.alerts_sent = self
            .evaluator
            .run_pass(&self.store, &self.dispatcher, &pairs)
            .await?;

        info!(
            pairs = summary.pairs_processed,
            skipped = summary.pairs_skipped,
            candles = summary.candles_written,
            failures = summary.fetch_failures,
            alerts = summary.alerts_sent,
            "pass complete"
        );
        Ok(summary)
    }

    /// Ingest one (instrument, timeframe) pair.
    ///
    /// `Ok(None)` means the schedule gate decided no fetch was due;
    /// `Ok(Some(n))` reports candles written.
    async fn ingest_pair(
        &mut self,
        instrument: &Instrument,
        interval: &str,
    ) -> Result<Option<usize>> {
        let symbol = instrument.symbol.as_str();
        let last_open = self.store.latest_open_time(symbol, interval)?;

        // Sentinel 0 = never fetched: bypass the gate entirely.
        if last_open != 0 && !schedule::should_fetch(interval, last_open)? {
            debug!(symbol, interval, last_open, "no new bucket due — skipped");
            return Ok(None);
        }

        let source = match instrument.kind {
            InstrumentKind::Crypto => &self.crypto_source,
            InstrumentKind::Equity => &self.equity_source,
        };
        let since = (last_open != 0).then_some(last_open);
        let rows = source
            .fetch_candles(symbol, interval, since, self.config.fetch_limit)
            .await?;

        if rows.is_empty() {
            debug!(symbol, interval, "fetch returned no rows");
            return Ok(Some(0));
        }

        let mut records = normalize_batch(symbol, interval, &rows);

        // Warm-up closes from the store so incremental batches still get an
        // RSI value.  A failure here is a per-pair normalization error.
        let first_open = records
            .first()
            .map(|r| r.open_time)
            .unwrap_or(i64::MAX);
        let history = self.store.recent_closes_before(
            symbol,
            interval,
            first_open,
            self.config.rsi_period + RSI_WARMUP_MARGIN,
        )?;
        attach_rsi(&history, &mut records, self.config.rsi_period)?;

        let written = self
            .store
            .upsert_batch(&records, self.config.batch_size)?;
        debug!(symbol, interval, written, "pair ingested");
        Ok(Some(written))
    }

    /// Run to completion: a single pass, or passes forever with a fixed
    /// sleep when the loop mode is enabled.
    pub async fn run(&mut self) -> Result<()> {
        self.validate()?;

        loop {
            self.run_pass().await?;

            if !self.config.loop_enabled {
                return Ok(());
            }
            debug!(
                secs = self.config.loop_interval_secs,
                "sleeping until next pass"
            );
            tokio::time::sleep(std::time::Duration::from_secs(
                self.config.loop_interval_secs,
            ))
            .await;
        }
    }
}
