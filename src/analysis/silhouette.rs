// src/analysis/silhouette.rs
//
// Fallback body-height estimate when no pose is available: accumulate
// frame differences over the whole clip, normalize, and take the tallest
// upright blob as the player.

use opencv::{
    core::{self, Mat, Point, Size, Vector},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SilhouetteConfig {
    /// Pair stride = max(1, pairs / max_pairs)
    pub max_pairs: usize,
    /// On the normalized 0..255 accumulator
    pub threshold: f64,
    pub close_kernel: i32,
    pub open_kernel: i32,
    pub min_area_fraction: f64,
    pub min_height_fraction: f64,
    pub max_height_fraction: f64,
    /// Height must be at least this multiple of the width
    pub min_upright_ratio: f64,
    pub max_width_fraction: f64,
}

impl Default for SilhouetteConfig {
    fn default() -> Self {
        Self {
            max_pairs: 60,
            threshold: 40.0,
            close_kernel: 21,
            open_kernel: 9,
            min_area_fraction: 0.005,
            min_height_fraction: 0.15,
            max_height_fraction: 0.95,
            min_upright_ratio: 1.2,
            max_width_fraction: 0.6,
        }
    }
}

/// Player height in pixels, or None when nothing qualifies
pub fn detect_player_height(frames: &[Mat], config: &SilhouetteConfig) -> Option<f64> {
    match try_detect_player_height(frames, config) {
        Ok(height) => height,
        Err(e) => {
            warn!("Silhouette detection failed: {}", e);
            None
        }
    }
}

fn try_detect_player_height(frames: &[Mat], config: &SilhouetteConfig) -> opencv::Result<Option<f64>> {
    if frames.len() < 2 {
        return Ok(None);
    }
    let (frame_w, frame_h) = (frames[0].cols(), frames[0].rows());
    let pairs = frames.len() - 1;
    let stride = (pairs / config.max_pairs.max(1)).max(1);

    let mut acc = Mat::new_rows_cols_with_default(frame_h, frame_w, core::CV_32FC1, core::Scalar::all(0.0))?;
    let mut diff = Mat::default();
    for i in (0..pairs).step_by(stride) {
        core::absdiff(&frames[i], &frames[i + 1], &mut diff)?;
        imgproc::accumulate_def(&diff, &mut acc)?;
    }

    let mut max_val = 0.0;
    core::min_max_loc(&acc, None, Some(&mut max_val), None, None, &core::no_array())?;
    if max_val <= 0.0 {
        debug!("Silhouette: no accumulated motion");
        return Ok(None);
    }

    let mut normalized = Mat::default();
    acc.convert_to(&mut normalized, core::CV_8U, 255.0 / max_val, 0.0)?;

    let mut mask = Mat::default();
    imgproc::threshold(&normalized, &mut mask, config.threshold, 255.0, imgproc::THRESH_BINARY)?;

    let close = imgproc::get_structuring_element_def(
        imgproc::MORPH_ELLIPSE,
        Size::new(config.close_kernel, config.close_kernel),
    )?;
    let open = imgproc::get_structuring_element_def(
        imgproc::MORPH_ELLIPSE,
        Size::new(config.open_kernel, config.open_kernel),
    )?;
    let mut closed = Mat::default();
    imgproc::morphology_ex_def(&mask, &mut closed, imgproc::MORPH_CLOSE, &close)?;
    let mut cleaned = Mat::default();
    imgproc::morphology_ex_def(&closed, &mut cleaned, imgproc::MORPH_OPEN, &open)?;

    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours_def(
        &cleaned,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
    )?;

    let frame_area = (frame_w * frame_h) as f64;
    let mut best: Option<f64> = None;
    for contour in contours.iter() {
        let area = imgproc::contour_area(&contour, false)?;
        if area < frame_area * config.min_area_fraction {
            continue;
        }

        let rect = imgproc::bounding_rect(&contour)?;
        let (w, h) = (rect.width as f64, rect.height as f64);
        let height_fraction = h / frame_h as f64;
        if height_fraction < config.min_height_fraction || height_fraction > config.max_height_fraction {
            continue;
        }
        if h < w * config.min_upright_ratio {
            continue;
        }
        if w / frame_w as f64 > config.max_width_fraction {
            continue;
        }

        if best.map_or(true, |b| h > b) {
            best = Some(h);
        }
    }

    debug!("Silhouette: {} contours, player height {:?}px", contours.len(), best);
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{blank_frame, frame_with_rect};

    #[test]
    fn test_upright_mover_gives_its_height() {
        // 16x50 block sliding right 2px per frame
        let frames: Vec<Mat> = (0..6)
            .map(|k| frame_with_rect(160, 120, 40 + 2 * k, 30, 16, 50))
            .collect();

        let height = detect_player_height(&frames, &SilhouetteConfig::default()).unwrap();
        assert!((height - 50.0).abs() <= 5.0, "height {}", height);
    }

    #[test]
    fn test_static_clip_has_no_silhouette() {
        let frames: Vec<Mat> = (0..5).map(|_| blank_frame(160, 120, 60.0)).collect();
        assert!(detect_player_height(&frames, &SilhouetteConfig::default()).is_none());
    }

    #[test]
    fn test_wide_mover_is_rejected() {
        // Lying flat: wider than tall
        let frames: Vec<Mat> = (0..6)
            .map(|k| frame_with_rect(160, 120, 20, 40 + 2 * k, 90, 20))
            .collect();
        assert!(detect_player_height(&frames, &SilhouetteConfig::default()).is_none());
    }
}
