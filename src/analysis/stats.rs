// src/analysis/stats.rs
//
// Small order-statistics helpers shared by the analysis stages.

/// Median with even-length averaging. None for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Percentile with linear interpolation between the two closest ranks.
/// Reorders `values` in place; 0.0 for an empty slice.
pub fn percentile(values: &mut [f32], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;

    let (_, lo_val, upper) = values.select_nth_unstable_by(lo, |a, b| a.total_cmp(b));
    let lo_val = *lo_val as f64;
    if frac == 0.0 || upper.is_empty() {
        return lo_val;
    }
    let hi_val = upper.iter().copied().fold(f32::INFINITY, f32::min) as f64;
    lo_val + (hi_val - lo_val) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_percentile_interpolates() {
        let mut values: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        assert!((percentile(&mut values, 99.0) - 99.0).abs() < 1e-9);

        let mut values = vec![0.0f32, 10.0];
        assert!((percentile(&mut values, 95.0) - 9.5).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_of_mostly_static_field() {
        // 1% of pixels moving fast: the 99th percentile sits at the boundary
        let mut values = vec![0.0f32; 990];
        values.extend(std::iter::repeat(8.0).take(10));
        let p = percentile(&mut values, 99.0);
        assert!(p > 0.0 && p <= 8.0);
        assert_eq!(percentile(&mut [], 99.0), 0.0);
    }
}
