// =============================================================================
// Binance Spot Klines — public REST API
// =============================================================================
//
// Fetches candlesticks from GET /api/v3/klines.  Only the public market-data
// endpoint is used, so no request signing is involved.  Binance returns each
// kline as a positional JSON array with numeric fields encoded as strings and
// the open time at index 0 in epoch milliseconds.
// =============================================================================

use async_trait::async_trait;
use tracing::debug;

use super::{MarketData, RawCandle};
use crate::error::{Result, WatchError};

const BINANCE_API_URL: &str = "https://api.binance.com";
/// Hard cap imposed by the endpoint.
const MAX_LIMIT: usize = 1000;

/// Public Binance klines client.
pub struct BinanceSource {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: BINANCE_API_URL.to_string(),
        }
    }

}

impl Default for BinanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketData for BinanceSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        since_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<RawCandle>> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval,
            limit.clamp(1, MAX_LIMIT)
        );
        if let Some(since) = since_ms {
            url.push_str(&format!("&startTime={since}"));
        }

        debug!(symbol, interval, "fetching Binance klines");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::Fetch(format!(
                "Binance klines returned {status} for {symbol}@{interval}: {body}"
            )));
        }

        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;
        let candles: Vec<RawCandle> = rows.iter().filter_map(|row| parse_kline_row(row)).collect();

        debug!(symbol, interval, count = candles.len(), "Binance klines fetched");
        Ok(candles)
    }

    fn venue(&self) -> &'static str {
        "binance"
    }
}

/// Parse one positional kline row:
/// `[open_time, open, high, low, close, volume, close_time, ...]`.
/// Rows that do not carry at least the first six fields are dropped.
fn parse_kline_row(row: &[serde_json::Value]) -> Option<RawCandle> {
    if row.len() < 6 {
        return None;
    }

    Some(RawCandle {
        timestamp: row[0].as_i64()?,
        open: value_as_f64(&row[1]),
        high: value_as_f64(&row[2]),
        low: value_as_f64(&row[3]),
        close: value_as_f64(&row[4]),
        volume: value_as_f64(&row[5]),
    })
}

/// Binance encodes prices as JSON strings; tolerate plain numbers too.
/// Unparseable or non-finite values become `None` rather than a fabricated 0.
fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::String(s) => s.parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}
