// =============================================================================
// Ingestion Normalizer
// =============================================================================
//
// Turns raw fetched rows into canonical store records:
//   - resolves the venue's timestamp unit (seconds vs milliseconds) ONCE per
//     batch, so a mixed batch can never be half-converted;
//   - scrubs NaN/non-finite prices into explicit nulls — 0 is a legitimate
//     price and must stay distinguishable from "absent";
//   - renders the display-only local_time string from the normalized open
//     time;
//   - preserves input order (the store does not).
//
// RSI attachment also lives in this stage: the stored `rsi` column is
// computed over store-provided warm-up closes plus the new batch, and
// insufficient history is surfaced as a normalization error for the caller
// to treat per-instrument.
// =============================================================================

use chrono::{Local, TimeZone};

use crate::error::{Result, WatchError};
use crate::indicators::rsi::rsi_series;
use crate::sources::RawCandle;
use crate::store::CandleRecord;

/// Timestamps below this are epoch seconds; at or above, epoch milliseconds.
/// (10^11 ms is 1973; 10^11 s is the year 5138 — the ranges cannot collide
/// for any plausible market data.)
const MS_EPOCH_FLOOR: i64 = 100_000_000_000;

/// Convert one fetched batch into canonical records for `(symbol, interval)`.
///
/// The unit heuristic is sampled from the FIRST row and applied to the whole
/// batch; venues do not mix units within one response, and per-row sampling
/// would corrupt a batch that happens to straddle the floor value.
pub fn normalize_batch(symbol: &str, interval: &str, rows: &[RawCandle]) -> Vec<CandleRecord> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let scale = if first.timestamp < MS_EPOCH_FLOOR { 1000 } else { 1 };

    rows.iter()
        .map(|row| {
            let open_time = row.timestamp * scale;
            CandleRecord {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
                open_time,
                open: scrub(row.open),
                high: scrub(row.high),
                low: scrub(row.low),
                close: scrub(row.close),
                volume: scrub(row.volume),
                rsi: None,
                local_time: render_local_time(open_time),
            }
        })
        .collect()
}

/// Fill the `rsi` column on `records` from `history_closes` (stored closes
/// preceding the batch, oldest first) plus the batch's own closes.
///
/// Records whose close is null, or that fall inside the warm-up window, keep
/// `rsi = None`.  If not even the final record can get a value, that is an
/// insufficient-history normalization failure.
pub fn attach_rsi(
    history_closes: &[f64],
    records: &mut [CandleRecord],
    period: usize,
) -> Result<()> {
    // Combined close series with a map back from record index to its
    // position in the series.
    let mut closes: Vec<f64> = history_closes.to_vec();
    let mut positions: Vec<Option<usize>> = Vec::with_capacity(records.len());
    for record in records.iter() {
        match record.close {
            Some(close) => {
                positions.push(Some(closes.len()));
                closes.push(close);
            }
            None => positions.push(None),
        }
    }

    if closes.len() < period + 1 {
        return Err(WatchError::Normalize(format!(
            "insufficient history for RSI({period}): {} closes available, need {}",
            closes.len(),
            period + 1
        )));
    }

    // rsi_series yields one value per close from index `period` onward.
    let series = rsi_series(&closes, period);
    let mut attached = 0usize;
    for (record, position) in records.iter_mut().zip(positions) {
        if let Some(pos) = position {
            if pos >= period {
                if let Some(&value) = series.get(pos - period) {
                    record.rsi = Some(value);
                    attached += 1;
                }
            }
        }
    }

    if attached == 0 {
        return Err(WatchError::Normalize(format!(
            "RSI({period}) could not be computed for any record in the batch"
        )));
    }

    Ok(())
}

/// Map a missing or non-finite value to an explicit null.
fn scrub(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Local wall-clock rendering of an epoch-ms open time, for display only.
fn render_local_time(open_time_ms: i64) -> Option<String> {
    Local
        .timestamp_millis_opt(open_time_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
}
