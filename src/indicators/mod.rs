// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free statistics computed from stored candle history.
// Every public function returns `Option<T>` (or an empty series) so callers
// are forced to handle insufficient-data and numerical-edge-case scenarios.
// The ingestion pipeline fills the stored `rsi` column from `rsi`; the alert
// formatter uses the rest for message context only.

pub mod adx;
pub mod bollinger;
pub mod rolling;
pub mod rsi;

/// Minimal OHLC bar for indicators that need more than closes (ADX).
/// Built from stored records whose price fields are all present.
#[derive(Debug, Clone, Copy)]
pub struct Ohlc {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}
