// =============================================================================
// Time / Schedule Gate
// =============================================================================
//
// Pure wall-clock decisions for the ingestion pipeline:
//   - Is a new fetch warranted for a (symbol, timeframe) pair?
//   - Has a candle's bucket fully elapsed, i.e. is it closed?
//
// Every decision is computed from UTC epoch milliseconds.  Mixing in local
// time here would shift candle boundaries by the zone offset, so the only
// place local time appears in this codebase is the display-only `local_time`
// column written by the normalizer.
// =============================================================================

use chrono::{Datelike, Local, Timelike, Utc};

use crate::error::{Result, WatchError};

/// Look up the bucket duration for a timeframe, in milliseconds.
///
/// The table is closed: strings outside it are configuration errors, never
/// guessed at.
pub fn timeframe_duration_ms(timeframe: &str) -> Result<i64> {
    let ms = match timeframe {
        "1m" => 60_000,
        "3m" => 180_000,
        "5m" => 300_000,
        "15m" => 900_000,
        "1h" => 3_600_000,
        "4h" => 14_400_000,
        "1d" => 86_400_000,
        "1w" => 604_800_000,
        other => return Err(WatchError::UnknownTimeframe(other.to_string())),
    };
    Ok(ms)
}

/// Current UTC time as epoch milliseconds.
pub fn utc_now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Whether a fetch is due: true iff at least one full bucket duration has
/// elapsed since the last stored open time.
///
/// The "never fetched" sentinel (`last_open_time_ms == 0`) is deliberately
/// NOT special-cased here — the caller bypasses the gate entirely for a key
/// with no history, so this formula only ever sees real open times.
pub fn should_fetch(timeframe: &str, last_open_time_ms: i64) -> Result<bool> {
    should_fetch_at(timeframe, last_open_time_ms, utc_now_ms())
}

/// `should_fetch` with an explicit clock, for tests.
pub fn should_fetch_at(timeframe: &str, last_open_time_ms: i64, now_ms: i64) -> Result<bool> {
    let duration = timeframe_duration_ms(timeframe)?;
    Ok(now_ms - last_open_time_ms >= duration)
}

/// Whether a candle's bucket has fully elapsed.
///
/// A candle opened at `open_time_ms` is final only once the current UTC time
/// reaches `open_time_ms + duration`; a just-opened candle is never final.
pub fn candle_is_final(timeframe: &str, open_time_ms: i64) -> Result<bool> {
    candle_is_final_at(timeframe, open_time_ms, utc_now_ms())
}

/// `candle_is_final` with an explicit clock, for tests.
pub fn candle_is_final_at(timeframe: &str, open_time_ms: i64, now_ms: i64) -> Result<bool> {
    let duration = timeframe_duration_ms(timeframe)?;
    Ok(now_ms >= open_time_ms + duration)
}

// =============================================================================
// Equity session gate
// =============================================================================

/// Local hour at which the US equity session is certainly over.
const EQUITY_QUIET_START_HOUR: u32 = 18;
/// Local hour before which the session has certainly not opened.
const EQUITY_QUIET_END_HOUR: u32 = 2;

/// Cheap approximation of "the US equity market is closed right now":
/// weekends, plus the local evening/early-morning window.  Good enough to
/// avoid pointless equity fetches; this is not an exchange calendar and does
/// not know about holidays.
pub fn equity_market_closed() -> bool {
    let now = Local::now();
    equity_market_closed_at(now.hour(), now.weekday().num_days_from_monday())
}

/// `equity_market_closed` with explicit local-hour / weekday inputs, for
/// tests.  `weekday_from_monday` is 0 = Monday .. 6 = Sunday.
pub fn equity_market_closed_at(local_hour: u32, weekday_from_monday: u32) -> bool {
    if weekday_from_monday >= 5 {
        return true;
    }
    local_hour >= EQUITY_QUIET_START_HOUR || local_hour < EQUITY_QUIET_END_HOUR
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn duration_table_values() {
        assert_eq!(timeframe_duration_ms("1m").unwrap(), 60_000);
        assert_eq!(timeframe_duration_ms("3m").unwrap(), 180_000);
        assert_eq!(timeframe_duration_ms("5m").unwrap(), 300_000);
        assert_eq!(timeframe_duration_ms("15m").unwrap(), 900_000);
        assert_eq!(timeframe_duration_ms("1h").unwrap(), 3_600_000);
        assert_eq!(timeframe_duration_ms("4h").unwrap(), 14_400_000);
        assert_eq!(timeframe_duration_ms("1d").unwrap(), 86_400_000);
        assert_eq!(timeframe_duration_ms("1w").unwrap(), 604_800_000);
    }

    #[test]
    fn unknown_timeframe_is_an_error() {
        assert!(matches!(
            timeframe_duration_ms("30m"),
            Err(WatchError::UnknownTimeframe(_))
        ));
        assert!(timeframe_duration_ms("").is_err());
    }

    #[test]
    fn should_fetch_after_full_bucket() {
        let now = 1_700_000_000_000;
        // 3 700 000 ms since last 1h open => due.
        assert!(should_fetch_at("1h", now - 3_700_000, now).unwrap());
        // Only 1 000 000 ms => not due.
        assert!(!should_fetch_at("1h", now - 1_000_000, now).unwrap());
    }

    #[test]
    fn should_fetch_exact_boundary() {
        let now = 1_700_000_000_000;
        assert!(should_fetch_at("1m", now - 60_000, now).unwrap());
        assert!(!should_fetch_at("1m", now - 59_999, now).unwrap());
    }

    #[test]
    fn candle_final_only_after_duration() {
        let open = 1_700_000_000_000;
        assert!(!candle_is_final_at("1m", open, open).unwrap());
        assert!(!candle_is_final_at("1m", open, open + 59_999).unwrap());
        assert!(candle_is_final_at("1m", open, open + 60_000).unwrap());
    }

    #[test]
    fn equity_gate_weekend() {
        // Saturday and Sunday are closed at any hour.
        assert!(equity_market_closed_at(10, 5));
        assert!(equity_market_closed_at(10, 6));
    }

    #[test]
    fn equity_gate_weekday_hours() {
        assert!(!equity_market_closed_at(10, 2));
        assert!(equity_market_closed_at(18, 2));
        assert!(equity_market_closed_at(23, 2));
        assert!(equity_market_closed_at(1, 2));
        assert!(!equity_market_closed_at(2, 2));
    }

    #[test]
    fn weekday_mapping_sanity() {
        // chrono's num_days_from_monday matches our 0..6 convention.
        let sat = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(sat.weekday().num_days_from_monday(), 5);
    }
}
