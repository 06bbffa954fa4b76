// src/analysis/peak.rs

use super::stats::mean;

/// Fastest moment of the swing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakEvent {
    /// Pair index into the magnitude series
    pub index: usize,
    pub raw: f64,
    /// Mean over the ±window neighborhood, clamped to the series
    pub smoothed: f64,
    /// max(raw, smoothed)
    pub magnitude: f64,
}

/// Argmax with first-index tie breaking, then neighborhood smoothing.
/// None for an empty series.
pub fn locate_peak(series: &[f64], window: usize) -> Option<PeakEvent> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &value) in series.iter().enumerate() {
        match best {
            Some((_, b)) if value <= b => {}
            _ => best = Some((i, value)),
        }
    }
    let (index, raw) = best?;

    let start = index.saturating_sub(window);
    let end = (index + window + 1).min(series.len());
    let smoothed = mean(&series[start..end]).unwrap_or(raw);

    Some(PeakEvent {
        index,
        raw,
        smoothed,
        magnitude: raw.max(smoothed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_maximum_wins() {
        let peak = locate_peak(&[1.0, 5.0, 2.0, 5.0], 2).unwrap();
        assert_eq!(peak.index, 1);
        assert_eq!(peak.raw, 5.0);
    }

    #[test]
    fn test_window_is_clamped_at_edges() {
        let peak = locate_peak(&[9.0, 3.0, 3.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(peak.index, 0);
        assert!((peak.smoothed - 5.0).abs() < 1e-12);
        assert_eq!(peak.magnitude, 9.0);
    }

    #[test]
    fn test_final_never_below_components() {
        let series_set: [&[f64]; 4] = [
            &[0.0, 0.0, 0.0],
            &[1.0, 2.0, 10.0, 2.0, 1.0],
            &[4.0],
            &[3.0, 2.9, 3.0, 2.95, 2.99, 0.1],
        ];
        for series in series_set {
            let peak = locate_peak(series, 2).unwrap();
            assert!(peak.magnitude >= peak.raw);
            assert!(peak.magnitude >= peak.smoothed);
            assert!(peak.index < series.len());
        }
    }

    #[test]
    fn test_empty_series_has_no_peak() {
        assert!(locate_peak(&[], 2).is_none());
    }
}
