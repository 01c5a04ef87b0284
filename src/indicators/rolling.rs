// =============================================================================
// Rolling-Window Statistics
// =============================================================================
//
// Percentiles, z-scores, and window minima over trailing close windows.
// These feed the alert-message context lines: where the latest close sits in
// its recent distribution, and how stretched it is from its rolling mean.

/// Percentile (0..=100, linear interpolation) of the last `window` values.
///
/// Returns `None` when `window` is zero, larger than the input, or `pct` is
/// outside [0, 100].
pub fn rolling_percentile(values: &[f64], window: usize, pct: f64) -> Option<f64> {
    if window == 0 || values.len() < window || !(0.0..=100.0).contains(&pct) {
        return None;
    }

    let mut tail: Vec<f64> = values[values.len() - window..].to_vec();
    if tail.iter().any(|v| !v.is_finite()) {
        return None;
    }
    tail.sort_by(|a, b| a.partial_cmp(b).expect("finite values compare"));

    // Linear interpolation between closest ranks.
    let rank = pct / 100.0 * (tail.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(tail[lo]);
    }
    let frac = rank - lo as f64;
    Some(tail[lo] + (tail[hi] - tail[lo]) * frac)
}

/// Z-score of the latest value against a rolling mean and a rolling standard
/// deviation, each over its own window (the mean window is typically slower).
///
/// Returns `None` on insufficient data or zero/non-finite deviation.
pub fn z_score(values: &[f64], mean_window: usize, std_window: usize) -> Option<f64> {
    if mean_window == 0 || std_window < 2 {
        return None;
    }
    if values.len() < mean_window || values.len() < std_window {
        return None;
    }

    let last = *values.last()?;

    let mean_tail = &values[values.len() - mean_window..];
    let mean = mean_tail.iter().sum::<f64>() / mean_window as f64;

    let std_tail = &values[values.len() - std_window..];
    let std_mean = std_tail.iter().sum::<f64>() / std_window as f64;
    let variance = std_tail
        .iter()
        .map(|v| (v - std_mean).powi(2))
        .sum::<f64>()
        / (std_window - 1) as f64;
    let std_dev = variance.sqrt();

    if std_dev == 0.0 || !std_dev.is_finite() {
        return None;
    }

    let z = (last - mean) / std_dev;
    z.is_finite().then_some(z)
}

/// Whether the latest value is the minimum of the last `window` values
/// (inclusive of itself).
pub fn is_window_minimum(values: &[f64], window: usize) -> Option<bool> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    let last = *values.last()?;
    Some(tail.iter().all(|&v| last <= v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_endpoints_and_median() {
        let values: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        assert_eq!(rolling_percentile(&values, 100, 0.0), Some(1.0));
        assert_eq!(rolling_percentile(&values, 100, 100.0), Some(100.0));
        let median = rolling_percentile(&values, 100, 50.0).unwrap();
        assert!((median - 50.5).abs() < 1e-10);
    }

    #[test]
    fn percentile_uses_trailing_window() {
        let mut values = vec![1_000.0; 10];
        values.extend((1..=50).map(|x| x as f64));
        // Window of 50 covers only the 1..=50 tail.
        assert_eq!(rolling_percentile(&values, 50, 100.0), Some(50.0));
    }

    #[test]
    fn percentile_insufficient_or_invalid() {
        let values = vec![1.0, 2.0, 3.0];
        assert!(rolling_percentile(&values, 5, 50.0).is_none());
        assert!(rolling_percentile(&values, 0, 50.0).is_none());
        assert!(rolling_percentile(&values, 3, 101.0).is_none());
    }

    #[test]
    fn z_score_flat_series_is_none() {
        let values = vec![100.0; 30];
        // Zero deviation — no meaningful z-score.
        assert!(z_score(&values, 20, 15).is_none());
    }

    #[test]
    fn z_score_sign_tracks_displacement() {
        // Tail dropping below a flat history => negative z.
        let mut values = vec![100.0; 25];
        values.extend([99.0, 98.0, 96.0, 93.0, 90.0]);
        let z = z_score(&values, 20, 15).unwrap();
        assert!(z < 0.0, "expected negative z-score, got {z}");

        let mut rising = vec![100.0; 25];
        rising.extend([101.0, 102.0, 104.0, 107.0, 110.0]);
        let z = z_score(&rising, 20, 15).unwrap();
        assert!(z > 0.0, "expected positive z-score, got {z}");
    }

    #[test]
    fn z_score_insufficient_data() {
        assert!(z_score(&[1.0, 2.0], 20, 15).is_none());
        assert!(z_score(&[], 20, 15).is_none());
    }

    #[test]
    fn window_minimum_detection() {
        let values = vec![5.0, 4.0, 3.0, 2.0, 1.0];
        assert_eq!(is_window_minimum(&values, 5), Some(true));

        let values = vec![1.0, 4.0, 3.0, 2.0, 5.0];
        assert_eq!(is_window_minimum(&values, 5), Some(false));

        // Ties count as a minimum.
        let values = vec![2.0, 1.0, 1.0];
        assert_eq!(is_window_minimum(&values, 3), Some(true));

        assert!(is_window_minimum(&values, 4).is_none());
    }
}
