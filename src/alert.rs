// =============================================================================
// Alert Evaluator — closed-candle scan with permanent dedupe
// =============================================================================
//
// One pass over every tracked (symbol, timeframe) pair after ingestion.  The
// candidate per pair is always the SECOND-most-recent stored candle: the most
// recent row may still be an open bucket, so it is deliberately never
// considered — even when its duration has in fact elapsed.
//
// Per candidate, in order, short-circuiting:
//   1. skip unless the candle is final (defensive double-check of the gate);
//   2. skip unless a rule's predicate fires (a null indicator never fires);
//   3. skip if this candle + alert type was already notified;
//   4. send, then record the dedupe marker.
//
// Send and record are not transactional: a crash between them yields one
// duplicate notification on the next run.  At-least-once, accepted.
// =============================================================================

use tracing::{debug, info};

use crate::error::Result;
use crate::indicators::adx::calculate_adx;
use crate::indicators::bollinger::calculate_bollinger;
use crate::indicators::rolling::z_score;
use crate::indicators::Ohlc;
use crate::notify::Dispatcher;
use crate::schedule;
use crate::store::{CandleRecord, CandleStore};

/// Default RSI oversold threshold.
pub const DEFAULT_RSI_THRESHOLD: f64 = 30.0;

/// Unified alert predicate.  Both variants read the same stored candidates
/// and dedupe through the same table; only the firing condition differs.
#[derive(Debug, Clone)]
pub enum AlertRule {
    /// Fire when the candidate's stored RSI is below the threshold.
    RsiUnder { threshold: f64 },
    /// Fire when at least one confirmation timeframe's candidate RSI is
    /// below the threshold.  The pair's own timeframe never counts as its
    /// own confirmation.
    RsiMultiTimeframe {
        timeframes: Vec<String>,
        threshold: f64,
    },
}

impl AlertRule {
    /// Stable key stored in the alerts table.
    pub fn alert_type(&self) -> &'static str {
        match self {
            AlertRule::RsiUnder { .. } => "rsi_under",
            AlertRule::RsiMultiTimeframe { .. } => "rsi_multi_tf",
        }
    }
}

/// Evaluates alert rules against the store and emits notifications.
pub struct AlertEvaluator {
    rules: Vec<AlertRule>,
}

impl AlertEvaluator {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self { rules }
    }

    /// Scan `pairs` once.  Returns the number of notifications sent.
    ///
    /// Store read/write errors propagate; notification failures do not (the
    /// dispatcher logs and swallows them), and the dedupe marker is written
    /// after the send attempt either way.
    pub async fn run_pass(
        &self,
        store: &CandleStore,
        dispatcher: &Dispatcher,
        pairs: &[(String, String)],
    ) -> Result<usize> {
        let mut sent = 0usize;

        for (symbol, interval) in pairs {
            let Some(candidate) = store.second_latest(symbol, interval)? else {
                continue;
            };

            if !schedule::candle_is_final(interval, candidate.open_time)? {
                debug!(symbol = %symbol, interval = %interval,
                    open_time = candidate.open_time, "candidate not final yet — skipped");
                continue;
            }

            for rule in &self.rules {
                let Some(message) = self.fire(rule, store, symbol, interval, &candidate)? else {
                    continue;
                };

                if store.alert_already_sent(
                    symbol,
                    interval,
                    candidate.open_time,
                    rule.alert_type(),
                )? {
                    debug!(symbol = %symbol, interval = %interval,
                        alert_type = rule.alert_type(),
                        "already notified for this candle — suppressed");
                    continue;
                }

                info!(symbol = %symbol, interval = %interval,
                    alert_type = rule.alert_type(),
                    open_time = candidate.open_time, "alert firing");
                dispatcher.broadcast(&message).await;
                store.record_alert_sent(
                    symbol,
                    interval,
                    candidate.open_time,
                    rule.alert_type(),
                )?;
                sent += 1;
            }
        }

        Ok(sent)
    }

    /// Apply one rule to one candidate; `Some(message)` when it fires.
    fn fire(
        &self,
        rule: &AlertRule,
        store: &CandleStore,
        symbol: &str,
        interval: &str,
        candidate: &CandleRecord,
    ) -> Result<Option<String>> {
        match rule {
            AlertRule::RsiUnder { threshold } => {
                let Some(rsi) = candidate.rsi else {
                    return Ok(None);
                };
                if rsi >= *threshold {
                    return Ok(None);
                }

                let mut message = format!(
                    "<b>{symbol}</b> {interval} oversold\nclose: {}  RSI: {rsi:.1}",
                    format_price(candidate.close),
                );
                for line in context_lines(store, symbol, interval, candidate.open_time)? {
                    message.push('\n');
                    message.push_str(&line);
                }
                Ok(Some(message))
            }

            AlertRule::RsiMultiTimeframe {
                timeframes,
                threshold,
            } => {
                let mut confirming = 0usize;
                let mut readings: Vec<String> = Vec::new();

                for tf in timeframes {
                    if tf == interval {
                        continue;
                    }
                    // A missing or unreadable confirmation candidate simply
                    // does not confirm.
                    let Some(other) = store.second_latest(symbol, tf)? else {
                        continue;
                    };
                    let Some(rsi) = other.rsi else {
                        continue;
                    };
                    readings.push(format!("RSI {rsi:.0} @ {tf}"));
                    if rsi < *threshold {
                        confirming += 1;
                    }
                }

                if confirming == 0 {
                    return Ok(None);
                }

                let mut message = format!(
                    "<b>{symbol}</b> {interval} multi-timeframe oversold\nclose: {}",
                    format_price(candidate.close),
                );
                for reading in readings {
                    message.push('\n');
                    message.push_str(&reading);
                }
                Ok(Some(message))
            }
        }
    }
}

/// Statistical context appended to threshold alerts: Bollinger position,
/// trend strength, and z-score stretch, computed from stored history up to
/// and including the candidate's bucket.  Any line that cannot be computed
/// is simply omitted — enrichment never blocks an alert.
fn context_lines(
    store: &CandleStore,
    symbol: &str,
    interval: &str,
    end_open_time: i64,
) -> Result<Vec<String>> {
    let history = store.query(symbol, interval, None, Some(end_open_time))?;
    let tail: Vec<&CandleRecord> = history.iter().rev().take(120).collect();
    let records: Vec<&CandleRecord> = tail.into_iter().rev().collect();

    let closes: Vec<f64> = records.iter().filter_map(|r| r.close).collect();
    let mut lines = Vec::new();

    if let (Some(bands), Some(&last_close)) =
        (calculate_bollinger(&closes, 20, 2.0), closes.last())
    {
        if last_close < bands.lower {
            lines.push(format!(
                "below lower band ({:.2} < {:.2})",
                last_close, bands.lower
            ));
        }
    }

    let bars: Vec<Ohlc> = records
        .iter()
        .filter_map(|r| {
            Some(Ohlc {
                high: r.high?,
                low: r.low?,
                close: r.close?,
            })
        })
        .collect();
    if let Some(adx) = calculate_adx(&bars, 14) {
        if adx.is_trending() {
            let direction = if adx.is_uptrend() { "up" } else { "down" };
            lines.push(format!("trending {direction} (ADX {:.1})", adx.adx));
        }
    }

    if let Some(z) = z_score(&closes, 20, 15) {
        if z <= -2.0 {
            lines.push(format!("z-score {z:.2}"));
        }
    }

    Ok(lines)
}

fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) => format!("{p:.2}"),
        None => "n/a".to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notify;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Notify for RecordingSink {
        async fn send(&self, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn channel(&self) -> &'static str {
            "recording"
        }
    }

    fn recording_dispatcher() -> (Dispatcher, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(vec![Box::new(RecordingSink { sent: sent.clone() })]);
        (dispatcher, sent)
    }

    fn record(symbol: &str, interval: &str, open_time: i64, rsi: Option<f64>) -> CandleRecord {
        CandleRecord {
            symbol: symbol.into(),
            interval: interval.into(),
            open_time,
            open: Some(99.0),
            high: Some(101.0),
            low: Some(98.0),
            close: Some(100.0),
            volume: Some(10.0),
            rsi,
            local_time: None,
        }
    }

    /// Open time far enough in the past that any timeframe is final.
    const OLD: i64 = 1_700_000_000_000;

    fn evaluator() -> AlertEvaluator {
        AlertEvaluator::new(vec![AlertRule::RsiUnder {
            threshold: DEFAULT_RSI_THRESHOLD,
        }])
    }

    fn pair(symbol: &str, interval: &str) -> Vec<(String, String)> {
        vec![(symbol.to_string(), interval.to_string())]
    }

    #[tokio::test]
    async fn never_selects_the_globally_latest_candle() {
        let mut store = CandleStore::open_in_memory().unwrap();
        // Oversold RSI on the LATEST candle must not fire; the candidate is
        // the second-most-recent, whose RSI is neutral.
        store.upsert(&record("BTCUSDT", "1h", OLD, Some(50.0))).unwrap();
        store
            .upsert(&record("BTCUSDT", "1h", OLD + 3_600_000, Some(25.0)))
            .unwrap();

        let (dispatcher, sent) = recording_dispatcher();
        let fired = evaluator()
            .run_pass(&store, &dispatcher, &pair("BTCUSDT", "1h"))
            .await
            .unwrap();

        assert_eq!(fired, 0);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversold_candidate_fires_exactly_once() {
        let mut store = CandleStore::open_in_memory().unwrap();
        store.upsert(&record("BTCUSDT", "1h", OLD, Some(25.0))).unwrap();
        store
            .upsert(&record("BTCUSDT", "1h", OLD + 3_600_000, Some(50.0)))
            .unwrap();

        let (dispatcher, sent) = recording_dispatcher();
        let evaluator = evaluator();
        let pairs = pair("BTCUSDT", "1h");

        let first = evaluator.run_pass(&store, &dispatcher, &pairs).await.unwrap();
        assert_eq!(first, 1);

        // Second pass over the same closed candle: suppressed by the dedupe
        // table, nothing sent.
        let second = evaluator.run_pass(&store, &dispatcher, &pairs).await.unwrap();
        assert_eq!(second, 0);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("BTCUSDT"));
        assert!(sent[0].contains("25.0"));
    }

    #[tokio::test]
    async fn null_rsi_never_fires() {
        let mut store = CandleStore::open_in_memory().unwrap();
        store.upsert(&record("BTCUSDT", "1h", OLD, None)).unwrap();
        store
            .upsert(&record("BTCUSDT", "1h", OLD + 3_600_000, Some(50.0)))
            .unwrap();

        let (dispatcher, sent) = recording_dispatcher();
        let fired = evaluator()
            .run_pass(&store, &dispatcher, &pair("BTCUSDT", "1h"))
            .await
            .unwrap();
        assert_eq!(fired, 0);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rsi_at_threshold_does_not_fire() {
        let mut store = CandleStore::open_in_memory().unwrap();
        store.upsert(&record("BTCUSDT", "1h", OLD, Some(30.0))).unwrap();
        store
            .upsert(&record("BTCUSDT", "1h", OLD + 3_600_000, Some(50.0)))
            .unwrap();

        let (dispatcher, _) = recording_dispatcher();
        let fired = evaluator()
            .run_pass(&store, &dispatcher, &pair("BTCUSDT", "1h"))
            .await
            .unwrap();
        assert_eq!(fired, 0);
    }

    #[tokio::test]
    async fn non_final_candidate_is_skipped() {
        let mut store = CandleStore::open_in_memory().unwrap();
        // The candidate bucket opened moments ago — a 1h candle cannot be
        // final yet, oversold or not.
        let now = schedule::utc_now_ms();
        store
            .upsert(&record("BTCUSDT", "1h", now - 1_000, Some(25.0)))
            .unwrap();
        store.upsert(&record("BTCUSDT", "1h", now, Some(25.0))).unwrap();

        let (dispatcher, sent) = recording_dispatcher();
        let fired = evaluator()
            .run_pass(&store, &dispatcher, &pair("BTCUSDT", "1h"))
            .await
            .unwrap();
        assert_eq!(fired, 0);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_row_key_has_no_candidate() {
        let mut store = CandleStore::open_in_memory().unwrap();
        store.upsert(&record("BTCUSDT", "1h", OLD, Some(25.0))).unwrap();

        let (dispatcher, _) = recording_dispatcher();
        let fired = evaluator()
            .run_pass(&store, &dispatcher, &pair("BTCUSDT", "1h"))
            .await
            .unwrap();
        assert_eq!(fired, 0);
    }

    #[tokio::test]
    async fn multi_timeframe_rule_fires_on_one_confirmation() {
        let mut store = CandleStore::open_in_memory().unwrap();
        // Base pair 3m: neutral candidate.
        store.upsert(&record("SOLUSDT", "3m", OLD, Some(50.0))).unwrap();
        store
            .upsert(&record("SOLUSDT", "3m", OLD + 180_000, Some(50.0)))
            .unwrap();
        // 1h confirmation candidate is oversold.
        store.upsert(&record("SOLUSDT", "1h", OLD, Some(22.0))).unwrap();
        store
            .upsert(&record("SOLUSDT", "1h", OLD + 3_600_000, Some(50.0)))
            .unwrap();

        let evaluator = AlertEvaluator::new(vec![AlertRule::RsiMultiTimeframe {
            timeframes: vec!["3m".into(), "1h".into(), "4h".into()],
            threshold: DEFAULT_RSI_THRESHOLD,
        }]);

        let (dispatcher, sent) = recording_dispatcher();
        let pairs = pair("SOLUSDT", "3m");
        let fired = evaluator.run_pass(&store, &dispatcher, &pairs).await.unwrap();
        assert_eq!(fired, 1);

        {
            let sent = sent.lock().unwrap();
            assert!(sent[0].contains("multi-timeframe"));
            assert!(sent[0].contains("1h"));
        }

        // Distinct alert_type from the plain threshold rule.
        assert!(store
            .alert_already_sent("SOLUSDT", "3m", OLD, "rsi_multi_tf")
            .unwrap());
        assert!(!store
            .alert_already_sent("SOLUSDT", "3m", OLD, "rsi_under")
            .unwrap());

        // Re-run: deduped.
        let again = evaluator.run_pass(&store, &dispatcher, &pairs).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn multi_timeframe_own_interval_never_confirms() {
        let mut store = CandleStore::open_in_memory().unwrap();
        // Only the base timeframe itself is oversold.
        store.upsert(&record("SOLUSDT", "3m", OLD, Some(20.0))).unwrap();
        store
            .upsert(&record("SOLUSDT", "3m", OLD + 180_000, Some(50.0)))
            .unwrap();

        let evaluator = AlertEvaluator::new(vec![AlertRule::RsiMultiTimeframe {
            timeframes: vec!["3m".into(), "1h".into()],
            threshold: DEFAULT_RSI_THRESHOLD,
        }]);

        let (dispatcher, _) = recording_dispatcher();
        let fired = evaluator
            .run_pass(&store, &dispatcher, &pair("SOLUSDT", "3m"))
            .await
            .unwrap();
        assert_eq!(fired, 0);
    }

    #[tokio::test]
    async fn context_lines_flag_band_break_and_downtrend() {
        let mut store = CandleStore::open_in_memory().unwrap();
        // 60 steadily falling candles, then the oversold candidate pair.
        for i in 0..60i64 {
            let close = 200.0 - i as f64 * 2.0;
            let mut r = record("BTCUSDT", "1h", OLD + i * 3_600_000, Some(40.0));
            r.open = Some(close + 1.0);
            r.high = Some(close + 2.0);
            r.low = Some(close - 2.0);
            r.close = Some(close);
            store.upsert(&r).unwrap();
        }
        // Candidate: second-latest, deeply below the falling series.
        let mut candidate = record("BTCUSDT", "1h", OLD + 60 * 3_600_000, Some(10.0));
        candidate.close = Some(40.0);
        candidate.high = Some(42.0);
        candidate.low = Some(38.0);
        store.upsert(&candidate).unwrap();
        store
            .upsert(&record("BTCUSDT", "1h", OLD + 61 * 3_600_000, Some(50.0)))
            .unwrap();

        let (dispatcher, sent) = recording_dispatcher();
        let fired = evaluator()
            .run_pass(&store, &dispatcher, &pair("BTCUSDT", "1h"))
            .await
            .unwrap();
        assert_eq!(fired, 1);

        let sent = sent.lock().unwrap();
        assert!(sent[0].contains("below lower band"), "message: {}", sent[0]);
        assert!(sent[0].contains("trending down"), "message: {}", sent[0]);
    }
}
