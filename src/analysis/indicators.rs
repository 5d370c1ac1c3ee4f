//! Statistical indicators over price and volume series.
//!
//! All functions are pure and return a neutral value (0, or 50 for RSI) when
//! the input is too short to say anything.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Simple period-over-period returns. Non-positive prices yield a zero return.
pub fn returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Pearson correlation of two equal-length series, in [-1, 1].
///
/// Returns 0 when either series is constant.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let (mean_a, mean_b) = (mean(a), mean(b));

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return 0.0;
    }
    (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0)
}

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> f64 {
    if values.is_empty() || period == 0 {
        return 0.0;
    }
    let start = values.len().saturating_sub(period);
    mean(&values[start..])
}

/// Relative strength index over the last `period` price changes, using simple
/// averages of gains and losses.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if prices.len() < period + 1 || period == 0 {
        return 50.0;
    }
    let tail = &prices[prices.len() - period - 1..];

    let (gains, losses) = tail.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let change = w[1] - w[0];
        if change > 0.0 {
            (g + change, l)
        } else {
            (g, l - change)
        }
    });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(approx(mean(&values), 5.0));
        assert!(approx(std_dev(&values), 2.0));
        assert_eq!(std_dev(&[1.0]), 0.0);
    }

    #[test]
    fn test_returns() {
        let r = returns(&[100.0, 110.0, 99.0]);
        assert!(approx(r[0], 0.1));
        assert!(approx(r[1], -0.1));
    }

    #[test]
    fn test_pearson() {
        let a = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(pearson(&a, &[2.0, 4.0, 6.0, 8.0]), 1.0));
        assert!(approx(pearson(&a, &[8.0, 6.0, 4.0, 2.0]), -1.0));
        assert_eq!(pearson(&a, &[5.0, 5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_sma_uses_tail() {
        let values: Vec<f64> = (1..=30).map(|v| v as f64).collect();
        // Last 20 values are 11..=30
        assert!(approx(sma(&values, 20), 20.5));
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..20).map(|v| 100.0 + v as f64).collect();
        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        let flat = vec![100.0; 20];

        assert!(approx(rsi(&rising, 14), 100.0));
        assert!(approx(rsi(&falling, 14), 0.0));
        assert!(approx(rsi(&flat, 14), 50.0));
        assert!(approx(rsi(&rising[..5], 14), 50.0));
    }

    #[test]
    fn test_rsi_balanced() {
        let zigzag: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        assert!(approx(rsi(&zigzag, 14), 50.0));
    }
}
