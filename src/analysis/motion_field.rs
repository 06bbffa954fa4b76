// src/analysis/motion_field.rs
//
// Dense motion between consecutive frames.
//
// Farneback optical flow per pair, reduced to the 99th-percentile magnitude.
// A high percentile rather than the mean keeps a small fast object (the
// stick blade) visible against a mostly static rink background.

use super::stats::percentile;
use opencv::{
    core::{self, Mat, Vector},
    prelude::*,
    video,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowParams {
    pub pyr_scale: f64,
    pub levels: i32,
    pub winsize: i32,
    pub iterations: i32,
    pub poly_n: i32,
    pub poly_sigma: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            winsize: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub flow: FlowParams,
    /// Percentile of the per-pixel magnitude kept for each pair
    pub percentile: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            flow: FlowParams::default(),
            percentile: 99.0,
        }
    }
}

// ============================================================================
// FLOW PRIMITIVES
// ============================================================================

/// Two-channel (dx, dy) CV_32F flow field from `prev` to `next`
pub fn dense_flow(prev: &Mat, next: &Mat, params: &FlowParams) -> opencv::Result<Mat> {
    let mut flow = Mat::default();
    video::calc_optical_flow_farneback(
        prev,
        next,
        &mut flow,
        params.pyr_scale,
        params.levels,
        params.winsize,
        params.iterations,
        params.poly_n,
        params.poly_sigma,
        0,
    )?;
    Ok(flow)
}

/// Per-pixel flow magnitude as a single-channel CV_32F Mat
pub fn flow_magnitude(flow: &Mat) -> opencv::Result<Mat> {
    let mut channels = Vector::<Mat>::new();
    core::split(flow, &mut channels)?;
    let mut magnitude = Mat::default();
    core::magnitude(&channels.get(0)?, &channels.get(1)?, &mut magnitude)?;
    Ok(magnitude)
}

/// Copy a CV_32F Mat's values into a flat Vec
pub fn mat_to_f32(mat: &Mat) -> opencv::Result<Vec<f32>> {
    if mat.is_continuous() {
        Ok(mat.data_typed::<f32>()?.to_vec())
    } else {
        let owned = mat.try_clone()?;
        Ok(owned.data_typed::<f32>()?.to_vec())
    }
}

// ============================================================================
// ESTIMATOR
// ============================================================================

pub struct MotionFieldEstimator<'a> {
    config: &'a MotionConfig,
}

impl<'a> MotionFieldEstimator<'a> {
    pub fn new(config: &'a MotionConfig) -> Self {
        Self { config }
    }

    /// Magnitude field for one pair
    pub fn pair_magnitude(&self, prev: &Mat, next: &Mat) -> opencv::Result<Mat> {
        let flow = dense_flow(prev, next, &self.config.flow)?;
        flow_magnitude(&flow)
    }

    /// One representative magnitude per consecutive pair, in index order.
    /// Length is always `frames.len() - 1` (empty for fewer than two frames).
    pub fn magnitude_series(&self, frames: &[Mat]) -> opencv::Result<Vec<f64>> {
        let mut series = Vec::with_capacity(frames.len().saturating_sub(1));

        for (i, pair) in frames.windows(2).enumerate() {
            let magnitude = self.pair_magnitude(&pair[0], &pair[1])?;
            let mut values = mat_to_f32(&magnitude)?;
            let representative = percentile(&mut values, self.config.percentile);
            debug!("Pair {}: p{} flow magnitude {:.3}", i, self.config.percentile, representative);
            series.push(representative);
        }

        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{blank_frame, frame_with_rect};

    #[test]
    fn test_series_length_is_pairs() {
        let config = MotionConfig::default();
        let estimator = MotionFieldEstimator::new(&config);

        for n in [0usize, 1, 2, 6] {
            let frames: Vec<Mat> = (0..n).map(|_| blank_frame(64, 48, 0.0)).collect();
            let series = estimator.magnitude_series(&frames).unwrap();
            assert_eq!(series.len(), n.saturating_sub(1));
        }
    }

    #[test]
    fn test_static_frames_have_no_motion() {
        let config = MotionConfig::default();
        let estimator = MotionFieldEstimator::new(&config);
        let frames: Vec<Mat> = (0..4).map(|_| blank_frame(80, 60, 90.0)).collect();

        let series = estimator.magnitude_series(&frames).unwrap();
        assert!(series.iter().all(|&m| m.abs() < 1e-3), "{:?}", series);
    }

    #[test]
    fn test_moving_block_registers_motion() {
        let config = MotionConfig::default();
        let estimator = MotionFieldEstimator::new(&config);
        let frames = vec![
            frame_with_rect(160, 120, 40, 40, 30, 30),
            frame_with_rect(160, 120, 40, 40, 30, 30),
            frame_with_rect(160, 120, 46, 40, 30, 30),
        ];

        let series = estimator.magnitude_series(&frames).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series[0] < 1e-3);
        assert!(series[1] > 0.5, "moving pair magnitude {}", series[1]);
    }
}
