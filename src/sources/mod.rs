// =============================================================================
// Market Data Sources
// =============================================================================
//
// Collaborators that fetch raw OHLCV rows over REST.  Each source speaks its
// venue's dialect and hands back `RawCandle` rows as received — timestamps in
// whatever unit the venue uses, prices possibly missing.  The ingestion
// normalizer owns the job of making those rows canonical.

pub mod binance;
pub mod yahoo;

pub use binance::BinanceSource;
pub use yahoo::YahooSource;

use async_trait::async_trait;

use crate::error::Result;

/// One raw fetched row, prior to normalization.
///
/// `timestamp` is the bucket open time in the venue's native epoch unit
/// (Binance: milliseconds, Yahoo: seconds).  Missing prices stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandle {
    pub timestamp: i64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// A market-data fetch collaborator.
///
/// `since_ms` is the last stored open time (epoch ms); `None` means "no
/// history — fetch a full window".  Implementations may raise on transient
/// network failure; the pipeline treats that per-instrument.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        since_ms: Option<i64>,
        limit: usize,
    ) -> Result<Vec<RawCandle>>;

    /// Venue label for logs and error messages.
    fn venue(&self) -> &'static str;
}
