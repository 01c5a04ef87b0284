// =============================================================================
// Average Directional Index (ADX) with ±DI
// =============================================================================
//
// ADX quantifies trend strength regardless of direction; the directional
// indicators (+DI / -DI) supply the direction.  The alert formatter reports
// "trending up/down" context lines when ADX clears its threshold, with the
// direction read off whichever DI is on top.
//
// Calculation pipeline:
//   1. +DM / -DM (directional movement) and True Range per bar.
//   2. Wilder's smoothing (period) of +DM, -DM, TR.
//   3. +DI = smoothed(+DM) / smoothed(TR) * 100, -DI likewise.
//   4. DX  = |+DI - -DI| / (+DI + -DI) * 100
//   5. ADX = Wilder's smoothed average of DX over `period` bars.
//
// ADX > 25 is conventionally read as "trending".
// =============================================================================

use super::Ohlc;

/// Conventional trend-strength threshold.
pub const ADX_TREND_THRESHOLD: f64 = 25.0;

/// Most recent ADX plus the directional indicators it was derived from.
#[derive(Debug, Clone)]
pub struct AdxResult {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

impl AdxResult {
    /// Trend strength has cleared the conventional threshold.
    pub fn is_trending(&self) -> bool {
        self.adx > ADX_TREND_THRESHOLD
    }

    /// Direction of a confirmed trend: +DI on top means up.
    pub fn is_uptrend(&self) -> bool {
        self.plus_di > self.minus_di
    }
}

/// Compute the most recent ADX value (with ±DI) from OHLC bars.
///
/// Returns `None` when:
/// - `period` is zero.
/// - Fewer than `2 * period + 1` bars (`period` bars seed the Wilder
///   smoothing, another `period` DX values seed the ADX average, and the
///   first bar has no predecessor).
/// - Any intermediate calculation produces a non-finite result.
pub fn calculate_adx(bars: &[Ohlc], period: usize) -> Option<AdxResult> {
    if period == 0 {
        return None;
    }

    let min_bars = 2 * period + 1;
    if bars.len() < min_bars {
        return None;
    }

    let period_f = period as f64;
    let n = bars.len();
    let transitions = n - 1;

    // --- Raw +DM, -DM, and True Range per consecutive pair -------------------
    let mut plus_dm = Vec::with_capacity(transitions);
    let mut minus_dm = Vec::with_capacity(transitions);
    let mut tr_vals = Vec::with_capacity(transitions);

    for i in 1..n {
        let high = bars[i].high;
        let low = bars[i].low;
        let prev = &bars[i - 1];

        let tr = (high - low)
            .max((high - prev.close).abs())
            .max((low - prev.close).abs());

        let up_move = high - prev.high;
        let down_move = prev.low - low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
        tr_vals.push(tr);
    }

    // --- Wilder's smoothing of +DM, -DM, TR ----------------------------------
    let mut smooth_plus_dm: f64 = plus_dm[..period].iter().sum();
    let mut smooth_minus_dm: f64 = minus_dm[..period].iter().sum();
    let mut smooth_tr: f64 = tr_vals[..period].iter().sum();

    let mut dx_values: Vec<f64> = Vec::with_capacity(transitions - period + 1);
    dx_values.push(compute_dx(smooth_plus_dm, smooth_minus_dm, smooth_tr)?);

    for i in period..transitions {
        smooth_plus_dm = smooth_plus_dm - smooth_plus_dm / period_f + plus_dm[i];
        smooth_minus_dm = smooth_minus_dm - smooth_minus_dm / period_f + minus_dm[i];
        smooth_tr = smooth_tr - smooth_tr / period_f + tr_vals[i];

        dx_values.push(compute_dx(smooth_plus_dm, smooth_minus_dm, smooth_tr)?);
    }

    // --- ADX = Wilder's smoothed average of DX -------------------------------
    if dx_values.len() < period {
        return None;
    }

    let adx_seed: f64 = dx_values[..period].iter().sum::<f64>() / period_f;
    if !adx_seed.is_finite() {
        return None;
    }

    let mut adx = adx_seed;
    for &dx in &dx_values[period..] {
        adx = (adx * (period_f - 1.0) + dx) / period_f;
        if !adx.is_finite() {
            return None;
        }
    }

    // Final ±DI from the last smoothed values, for direction.
    if smooth_tr == 0.0 {
        return None;
    }
    let plus_di = (smooth_plus_dm / smooth_tr) * 100.0;
    let minus_di = (smooth_minus_dm / smooth_tr) * 100.0;

    (adx.is_finite() && plus_di.is_finite() && minus_di.is_finite()).then_some(AdxResult {
        adx,
        plus_di,
        minus_di,
    })
}

/// Compute DX from smoothed +DM, -DM, and TR values.
///
/// Returns `None` if the TR divisor is zero or the result is non-finite;
/// zero directional movement on both sides yields `Some(0.0)`.
fn compute_dx(smooth_plus_dm: f64, smooth_minus_dm: f64, smooth_tr: f64) -> Option<f64> {
    if smooth_tr == 0.0 {
        return None;
    }

    let plus_di = (smooth_plus_dm / smooth_tr) * 100.0;
    let minus_di = (smooth_minus_dm / smooth_tr) * 100.0;

    let di_sum = plus_di + minus_di;
    if di_sum == 0.0 {
        return Some(0.0);
    }

    let dx = ((plus_di - minus_di).abs() / di_sum) * 100.0;
    dx.is_finite().then_some(dx)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn bar(high: f64, low: f64, close: f64) -> Ohlc {
        Ohlc { high, low, close }
    }

    #[test]
    fn adx_period_zero() {
        let bars = vec![bar(2.0, 0.5, 1.5); 50];
        assert!(calculate_adx(&bars, 0).is_none());
    }

    #[test]
    fn adx_insufficient_data() {
        let bars = vec![bar(2.0, 0.5, 1.5); 10];
        assert!(calculate_adx(&bars, 14).is_none());
    }

    #[test]
    fn adx_strong_uptrend_direction() {
        // Consecutive higher highs and higher lows — a strong uptrend.
        let bars: Vec<Ohlc> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                bar(base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();

        let result = calculate_adx(&bars, 14).unwrap();
        assert!(
            result.adx > ADX_TREND_THRESHOLD,
            "expected ADX > 25 for strong trend, got {}",
            result.adx
        );
        assert!(result.is_trending());
        assert!(result.is_uptrend());
        assert!(result.plus_di > result.minus_di);
    }

    #[test]
    fn adx_strong_downtrend_direction() {
        let bars: Vec<Ohlc> = (0..60)
            .map(|i| {
                let base = 300.0 - i as f64 * 2.0;
                bar(base + 0.5, base - 1.5, base - 1.0)
            })
            .collect();

        let result = calculate_adx(&bars, 14).unwrap();
        assert!(result.is_trending());
        assert!(!result.is_uptrend());
        assert!(result.minus_di > result.plus_di);
    }

    #[test]
    fn adx_flat_market_near_zero() {
        // Identical bars — no directional movement, DX = 0 throughout.
        let bars = vec![bar(101.0, 99.0, 100.0); 60];
        let result = calculate_adx(&bars, 14).unwrap();
        assert!(
            result.adx < 1.0,
            "expected ADX near 0 for flat market, got {}",
            result.adx
        );
        assert!(!result.is_trending());
    }

    #[test]
    fn adx_result_range() {
        let bars: Vec<Ohlc> = (0..100)
            .map(|i| {
                let base = 50.0 + (i as f64 * 0.3).sin() * 10.0;
                bar(base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        if let Some(result) = calculate_adx(&bars, 14) {
            assert!(
                (0.0..=100.0).contains(&result.adx),
                "ADX {} out of [0,100] range",
                result.adx
            );
        }
    }

    #[test]
    fn adx_minimum_bars_exact() {
        let period = 5;
        let min = 2 * period + 1; // 11
        let bars: Vec<Ohlc> = (0..min)
            .map(|i| {
                let base = 100.0 + i as f64;
                bar(base + 1.0, base - 0.5, base + 0.5)
            })
            .collect();
        assert!(calculate_adx(&bars, period).is_some());
        assert!(calculate_adx(&bars[..min - 1], period).is_none());
    }
}
