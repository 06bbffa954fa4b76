// src/analysis/stick_detector.rs
//
// Stick length in pixels from three independent candidate generators:
//
//   flow:  thresholded flow magnitude over the frames around the peak,
//          multi-frame median with outlier rejection
//   ridge: tubular enhancement of the peak-pair difference
//   edge:  thresholded peak-pair difference, bridged by directional dilation
//
// All three end in the same contour scorer, which keeps the most elongated
// stick-sized blob. Every detector returns None on failure; none of them can
// abort the analysis.

use super::motion_field::{mat_to_f32, MotionConfig, MotionFieldEstimator};
use super::ridge_filter::{frangi_bright, RidgeConfig};
use super::stats::{median, percentile};
use opencv::{
    core::{self, Mat, Point, Size, Vector},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StickConfig {
    /// Contours below this fraction of the frame area are noise
    pub min_area_fraction: f64,
    pub min_aspect_ratio: f64,
    /// Allowed stick length as a fraction of frame width
    pub min_frame_ratio: f64,
    pub max_frame_ratio: f64,
    /// Elliptical close/open kernel size
    pub cleanup_kernel: i32,

    pub flow_window: usize,
    /// Pairs weaker than this fraction of the peak pair are skipped
    pub flow_min_peak_fraction: f64,
    pub flow_mask_percentile: f64,
    /// Candidates further than this from the median are outliers
    pub flow_inlier_tolerance: f64,

    pub edge_diff_threshold: f64,
    pub edge_dilate_long: i32,
    pub edge_dilate_short: i32,
    pub edge_horizontal_iterations: i32,
    pub edge_vertical_iterations: i32,

    pub ridge: RidgeConfig,
}

impl Default for StickConfig {
    fn default() -> Self {
        Self {
            min_area_fraction: 0.0005,
            min_aspect_ratio: 4.0,
            min_frame_ratio: 0.05,
            max_frame_ratio: 0.80,
            cleanup_kernel: 5,
            flow_window: 3,
            flow_min_peak_fraction: 0.4,
            flow_mask_percentile: 95.0,
            flow_inlier_tolerance: 0.25,
            edge_diff_threshold: 25.0,
            edge_dilate_long: 9,
            edge_dilate_short: 3,
            edge_horizontal_iterations: 2,
            edge_vertical_iterations: 1,
            ridge: RidgeConfig::default(),
        }
    }
}

// ============================================================================
// SHARED CONTOUR SCORER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickCandidate {
    pub length: f64,
    pub width: f64,
    pub aspect_ratio: f64,
    pub score: f64,
}

/// Shape test for one contour given its area and minimum-area rectangle.
pub fn score_stick_shape(
    area: f64,
    rect_w: f64,
    rect_h: f64,
    frame_w: f64,
    frame_h: f64,
    config: &StickConfig,
) -> Option<StickCandidate> {
    if area < frame_w * frame_h * config.min_area_fraction {
        return None;
    }

    let length = rect_w.max(rect_h);
    let short = rect_w.min(rect_h);
    let width = if short > 0.0 { short } else { 1.0 };

    let aspect_ratio = length / width;
    if aspect_ratio < config.min_aspect_ratio {
        return None;
    }

    let frame_ratio = length / frame_w;
    if frame_ratio < config.min_frame_ratio || frame_ratio > config.max_frame_ratio {
        return None;
    }

    Some(StickCandidate {
        length,
        width,
        aspect_ratio,
        score: aspect_ratio * area.sqrt(),
    })
}

/// Most stick-like contour (highest aspect × √area). Returns its length.
pub fn best_stick_contour(
    contours: &Vector<Vector<Point>>,
    frame_w: i32,
    frame_h: i32,
    config: &StickConfig,
) -> opencv::Result<Option<f64>> {
    let mut best: Option<StickCandidate> = None;

    for contour in contours.iter() {
        let area = imgproc::contour_area(&contour, false)?;
        if area <= 0.0 {
            continue;
        }
        let rect = imgproc::min_area_rect(&contour)?;
        let candidate = score_stick_shape(
            area,
            rect.size.width as f64,
            rect.size.height as f64,
            frame_w as f64,
            frame_h as f64,
            config,
        );

        if let Some(c) = candidate {
            if best.map_or(true, |b| c.score > b.score) {
                best = Some(c);
            }
        }
    }

    Ok(best.map(|c| c.length))
}

/// Close then open with an elliptical kernel
pub fn clean_mask(mask: &Mat, kernel_size: i32) -> opencv::Result<Mat> {
    let kernel = imgproc::get_structuring_element_def(
        imgproc::MORPH_ELLIPSE,
        Size::new(kernel_size, kernel_size),
    )?;
    let mut closed = Mat::default();
    imgproc::morphology_ex_def(mask, &mut closed, imgproc::MORPH_CLOSE, &kernel)?;
    let mut opened = Mat::default();
    imgproc::morphology_ex_def(&closed, &mut opened, imgproc::MORPH_OPEN, &kernel)?;
    Ok(opened)
}

/// Clean a binary CV_8U mask and score its external contours
pub fn stick_in_mask(mask: &Mat, config: &StickConfig) -> opencv::Result<Option<f64>> {
    let cleaned = clean_mask(mask, config.cleanup_kernel)?;
    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours_def(
        &cleaned,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
    )?;
    best_stick_contour(&contours, mask.cols(), mask.rows(), config)
}

/// Build a CV_8U mask from a row-major byte buffer
pub fn mask_from_bytes(bytes: &[u8], rows: i32) -> opencv::Result<Mat> {
    let flat = Mat::from_slice(bytes)?;
    flat.reshape(1, rows)?.try_clone()
}

// ============================================================================
// DETECTORS
// ============================================================================

pub struct StickDetector<'a> {
    config: &'a StickConfig,
    motion: MotionFieldEstimator<'a>,
}

impl<'a> StickDetector<'a> {
    pub fn new(config: &'a StickConfig, motion: &'a MotionConfig) -> Self {
        Self {
            config,
            motion: MotionFieldEstimator::new(motion),
        }
    }

    /// Flow-based length: median over the strong pairs around the peak
    pub fn from_flow(&self, frames: &[Mat], series: &[f64], peak_idx: usize) -> Option<f64> {
        match self.try_from_flow(frames, series, peak_idx) {
            Ok(length) => length,
            Err(e) => {
                warn!("Flow stick detection failed: {}", e);
                None
            }
        }
    }

    /// Ridge-based length on the peak pair difference
    pub fn from_ridges(&self, frames: &[Mat], peak_idx: usize) -> Option<f64> {
        match self.try_from_ridges(frames, peak_idx) {
            Ok(length) => length,
            Err(e) => {
                warn!("Ridge stick detection failed: {}", e);
                None
            }
        }
    }

    /// Edge-based length on the peak pair difference
    pub fn from_edges(&self, frames: &[Mat], peak_idx: usize) -> Option<f64> {
        match self.try_from_edges(frames, peak_idx) {
            Ok(length) => length,
            Err(e) => {
                warn!("Edge stick detection failed: {}", e);
                None
            }
        }
    }

    fn try_from_flow(
        &self,
        frames: &[Mat],
        series: &[f64],
        peak_idx: usize,
    ) -> opencv::Result<Option<f64>> {
        if frames.len() < 2 || peak_idx >= series.len() {
            return Ok(None);
        }
        let peak_mag = series[peak_idx];
        let window = self.config.flow_window;
        let start = peak_idx.saturating_sub(window);
        let end = (peak_idx + window).min(frames.len() - 2);

        let mut candidates = Vec::new();
        for idx in start..=end {
            if series[idx] < peak_mag * self.config.flow_min_peak_fraction {
                continue;
            }
            let magnitude = self.motion.pair_magnitude(&frames[idx], &frames[idx + 1])?;
            if let Some(length) = self.stick_from_magnitude(&magnitude)? {
                debug!("Flow stick candidate at pair {}: {:.1}px", idx, length);
                candidates.push(length);
            }
        }

        let Some(median_px) = median(&candidates) else {
            return Ok(None);
        };

        let tol = self.config.flow_inlier_tolerance;
        let inliers: Vec<f64> = candidates
            .iter()
            .copied()
            .filter(|c| {
                let ratio = c / median_px;
                ratio > 1.0 - tol && ratio < 1.0 + tol
            })
            .collect();

        Ok(Some(median(&inliers).unwrap_or(median_px)))
    }

    fn stick_from_magnitude(&self, magnitude: &Mat) -> opencv::Result<Option<f64>> {
        let mut values = mat_to_f32(magnitude)?;
        let threshold = percentile(&mut values, self.config.flow_mask_percentile);

        let mut mask_f = Mat::default();
        imgproc::threshold(magnitude, &mut mask_f, threshold, 255.0, imgproc::THRESH_BINARY)?;
        let mut mask = Mat::default();
        mask_f.convert_to(&mut mask, core::CV_8U, 1.0, 0.0)?;

        stick_in_mask(&mask, self.config)
    }

    fn peak_difference(frames: &[Mat], peak_idx: usize) -> opencv::Result<Option<Mat>> {
        if frames.len() < 2 {
            return Ok(None);
        }
        let idx = peak_idx.min(frames.len() - 2);
        let mut diff = Mat::default();
        core::absdiff(&frames[idx], &frames[idx + 1], &mut diff)?;
        Ok(Some(diff))
    }

    fn try_from_ridges(&self, frames: &[Mat], peak_idx: usize) -> opencv::Result<Option<f64>> {
        let Some(diff) = Self::peak_difference(frames, peak_idx)? else {
            return Ok(None);
        };

        let mut normalized = Mat::default();
        diff.convert_to(&mut normalized, core::CV_32F, 1.0 / 255.0, 0.0)?;

        let response = frangi_bright(&normalized, &self.config.ridge)?;
        let max_response = response.iter().copied().fold(0.0f32, f32::max);
        if max_response <= 0.0 {
            return Ok(None);
        }

        let cutoff = max_response * self.config.ridge.threshold_fraction as f32;
        let bytes: Vec<u8> = response
            .iter()
            .map(|&v| if v > cutoff { 255 } else { 0 })
            .collect();
        let mask = mask_from_bytes(&bytes, diff.rows())?;

        stick_in_mask(&mask, self.config)
    }

    fn try_from_edges(&self, frames: &[Mat], peak_idx: usize) -> opencv::Result<Option<f64>> {
        let Some(diff) = Self::peak_difference(frames, peak_idx)? else {
            return Ok(None);
        };

        let mut thresh = Mat::default();
        imgproc::threshold(
            &diff,
            &mut thresh,
            self.config.edge_diff_threshold,
            255.0,
            imgproc::THRESH_BINARY,
        )?;

        let long = self.config.edge_dilate_long;
        let short = self.config.edge_dilate_short;
        let horizontal =
            imgproc::get_structuring_element_def(imgproc::MORPH_RECT, Size::new(long, short))?;
        let vertical =
            imgproc::get_structuring_element_def(imgproc::MORPH_RECT, Size::new(short, long))?;

        let mut widened = Mat::default();
        dilate(&thresh, &mut widened, &horizontal, self.config.edge_horizontal_iterations)?;
        let mut bridged = Mat::default();
        dilate(&widened, &mut bridged, &vertical, self.config.edge_vertical_iterations)?;

        stick_in_mask(&bridged, self.config)
    }
}

fn dilate(src: &Mat, dst: &mut Mat, kernel: &Mat, iterations: i32) -> opencv::Result<()> {
    imgproc::dilate(
        src,
        dst,
        kernel,
        Point::new(-1, -1),
        iterations,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{blank_frame, draw_rect, frame_with_rect};

    #[test]
    fn test_scorer_rejects_short_wide_and_oversized_shapes() {
        let config = StickConfig::default();
        // frame 640x480
        assert!(score_stick_shape(5000.0, 200.0, 25.0, 640.0, 480.0, &config).is_some());
        // aspect 2:1
        assert!(score_stick_shape(5000.0, 100.0, 50.0, 640.0, 480.0, &config).is_none());
        // 90% of frame width
        assert!(score_stick_shape(9000.0, 576.0, 16.0, 640.0, 480.0, &config).is_none());
        // under 5% of frame width
        assert!(score_stick_shape(200.0, 30.0, 5.0, 640.0, 480.0, &config).is_none());
        // below the area floor
        assert!(score_stick_shape(100.0, 200.0, 1.0, 640.0, 480.0, &config).is_none());
    }

    #[test]
    fn test_scorer_floors_zero_width() {
        let config = StickConfig::default();
        let c = score_stick_shape(400.0, 0.0, 100.0, 640.0, 480.0, &config).unwrap();
        assert_eq!(c.width, 1.0);
        assert_eq!(c.aspect_ratio, 100.0);
    }

    #[test]
    fn test_best_contour_prefers_elongated_blob() {
        let config = StickConfig::default();
        let mut mask = blank_frame(640, 480, 0.0);
        draw_rect(&mut mask, 50, 50, 256, 42, 255.0);
        draw_rect(&mut mask, 400, 300, 80, 80, 255.0);

        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours_def(
            &mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
        )
        .unwrap();

        let length = best_stick_contour(&contours, 640, 480, &config).unwrap().unwrap();
        assert!((length - 256.0).abs() <= 256.0 * 0.1, "length {}", length);
    }

    #[test]
    fn test_edge_detector_measures_translating_stick() {
        // 6:1 bright bar spanning 40% of the width, moved 12px down
        let config = StickConfig::default();
        let motion = MotionConfig::default();
        let detector = StickDetector::new(&config, &motion);
        let frames = vec![
            frame_with_rect(640, 480, 180, 200, 256, 43),
            frame_with_rect(640, 480, 180, 212, 256, 43),
        ];

        let length = detector.from_edges(&frames, 0).unwrap();
        assert!((length - 256.0).abs() <= 256.0 * 0.1, "length {}", length);
    }

    #[test]
    fn test_detectors_find_nothing_without_motion() {
        let config = StickConfig::default();
        let motion = MotionConfig::default();
        let detector = StickDetector::new(&config, &motion);
        let frames: Vec<Mat> = (0..4).map(|_| blank_frame(160, 120, 80.0)).collect();
        let series = vec![0.0; 3];

        assert!(detector.from_edges(&frames, 0).is_none());
        assert!(detector.from_ridges(&frames, 0).is_none());
        assert!(detector.from_flow(&frames, &series, 0).is_none());
    }
}
