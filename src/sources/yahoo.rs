// =============================================================================
// Yahoo Finance Chart API — equity OHLCV
// =============================================================================
//
// Fetches equity candles from GET /v8/finance/chart/{symbol}.  Two quirks the
// rest of the pipeline is built to absorb:
//   - timestamps are epoch SECONDS (Binance uses milliseconds), which is why
//     the normalizer carries a unit heuristic;
//   - quote arrays contain explicit nulls for halted/thin buckets, which is
//     why candle price fields are nullable end-to-end.
// =============================================================================

use async_trait::async_trait;
use tracing::debug;

use super::{MarketData, RawCandle};
use crate::error::{Result, WatchError};

const YAHOO_API_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance chart client for equity symbols.
pub struct YahooSource {
    client: reqwest::Client,
    base_url: String,
}

impl YahooSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            // Yahoo rejects requests without a browser-ish agent.
            .user_agent("Mozilla/5.0 (compatible; candlewatch/0.1)")
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: YAHOO_API_URL.to_string(),
        }
    }
}

impl Default for YahooSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Yahoo's interval token for one of our timeframes.  Only the timeframes
/// the chart API actually serves are mapped; anything else is a fetch error
/// rather than a silent approximation.
fn yahoo_interval(interval: &str) -> Option<&'static str> {
    match interval {
        "1m" => Some("1m"),
        "5m" => Some("5m"),
        "15m" => Some("15m"),
        "1h" => Some("1h"),
        "1d" => Some("1d"),
        "1w" => Some("1wk"),
        _ => None,
    }
}

/// How far back to ask for, per interval — mirrors the venue's own limits on
/// intraday history.
fn yahoo_range(interval: &str) -> &'static str {
    match interval {
        "1m" => "1d",
        "5m" | "15m" => "5d",
        "1h" => "1mo",
        "1w" => "2y",
        _ => "6mo",
    }
}

#[async_trait]
impl MarketData for YahooSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        since_ms: Option<i64>,
        _limit: usize,
    ) -> Result<Vec<RawCandle>> {
        let venue_interval = yahoo_interval(interval).ok_or_else(|| {
            WatchError::Fetch(format!(
                "Yahoo chart API does not serve interval {interval}"
            ))
        })?;
        let range = yahoo_range(interval);

        let url = format!(
            "{}/v8/finance/chart/{}?interval={}&range={}",
            self.base_url, symbol, venue_interval, range
        );

        debug!(symbol, interval, range, "fetching Yahoo chart");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::Fetch(format!(
                "Yahoo chart returned {status} for {symbol}@{interval}"
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let mut candles = parse_chart(&body)?;

        // Yahoo serves epoch seconds; trim to strictly-newer rows here, in
        // the venue's own unit.
        if let Some(since_ms) = since_ms {
            let since_s = since_ms / 1000;
            candles.retain(|c| c.timestamp > since_s);
        }

        debug!(symbol, interval, count = candles.len(), "Yahoo chart fetched");
        Ok(candles)
    }

    fn venue(&self) -> &'static str {
        "yahoo"
    }
}

/// Pull raw rows out of a chart response.  Null quote entries stay `None`.
fn parse_chart(body: &serde_json::Value) -> Result<Vec<RawCandle>> {
    let result = &body["chart"]["result"][0];
    if result.is_null() {
        let err = body["chart"]["error"]["description"]
            .as_str()
            .unwrap_or("empty chart result");
        return Err(WatchError::Fetch(format!("Yahoo chart error: {err}")));
    }

    let timestamps = result["timestamp"].as_array().cloned().unwrap_or_default();
    let quote = &result["indicators"]["quote"][0];

    let field = |name: &str, i: usize| -> Option<f64> {
        let v = quote[name].get(i)?.as_f64()?;
        v.is_finite().then_some(v)
    };

    let candles = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            Some(RawCandle {
                timestamp: ts.as_i64()?,
                open: field("open", i),
                high: field("high", i),
                low: field("low", i),
                close: field("close", i),
                volume: field("volume", i),
            })
        })
        .collect();

    Ok(candles)
}
