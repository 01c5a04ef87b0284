// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band (SMA), upper band (SMA + k*σ), lower band (SMA - k*σ).  The
// alert formatter uses the lower band as oversold context: a close under the
// lower band alongside a depressed RSI is the classic mean-reversion setup
// the notifications describe.

/// Result of a Bollinger Band calculation over the trailing `period` closes.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Calculate Bollinger Bands from the tail of `closes`.
///
/// Returns `None` when:
/// - `period` is zero or there are fewer than `period` closes.
/// - The middle band is zero or any band is non-finite (degenerate input).
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;

    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;

    (upper.is_finite() && lower.is_finite()).then_some(BollingerBands {
        upper,
        middle,
        lower,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bands = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bands.upper > bands.middle);
        assert!(bands.lower < bands.middle);
        // SMA of 1..=20 is 10.5.
        assert!((bands.middle - 10.5).abs() < 1e-10);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let closes = vec![1.0, 2.0, 3.0];
        assert!(calculate_bollinger(&closes, 20, 2.0).is_none());
    }

    #[test]
    fn bollinger_flat_collapses_to_middle() {
        let closes = vec![100.0; 20];
        let bands = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!((bands.upper - 100.0).abs() < 1e-10);
        assert!((bands.lower - 100.0).abs() < 1e-10);
    }

    #[test]
    fn bollinger_uses_trailing_window_only() {
        // A huge value outside the trailing window must not affect the bands.
        let mut closes = vec![1_000_000.0];
        closes.extend(std::iter::repeat(100.0).take(20));
        let bands = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!((bands.middle - 100.0).abs() < 1e-10);
    }
}
