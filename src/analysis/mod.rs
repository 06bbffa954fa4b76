// src/analysis/mod.rs
//
// Swing speed estimation modules.
//
// Signal flow:
//   Frames → motion_field → peak ─────────────────────────────┐
//          ↘ stick_detector (flow / ridge / edge) ─┐          │
//          ↘ silhouette (no pose only) ────────────┼→ calibration → speed → confidence
//   Pose   → body_measurement ─────────────────────┘          │
//          ↘ wrist speed ─────────────────────────────────────┘
//
// Orchestrated by swing_pipeline::SwingAnalyzer.

pub mod calibration;
pub mod confidence;
pub mod motion_field;
pub mod peak;
pub mod ridge_filter;
pub mod silhouette;
pub mod speed;
pub mod stats;
pub mod stick_detector;
pub mod swing_pipeline;

use crate::pose::PoseSamplerConfig;
use serde::{Deserialize, Serialize};

pub use calibration::{
    CalibrationConfig, CalibrationEstimate, CalibrationMethod, FusedCalibration, FusionConfig,
};
pub use confidence::{ConfidenceBreakdown, ConfidenceConfig, ConfidenceScorer};
pub use motion_field::{MotionConfig, MotionFieldEstimator};
pub use peak::{locate_peak, PeakEvent};
pub use silhouette::SilhouetteConfig;
pub use speed::{SpeedConfig, SpeedReport};
pub use stick_detector::{StickConfig, StickDetector};
pub use swing_pipeline::{AnalysisRequest, SwingAnalyzer};

/// Every heuristic constant of the analyzer, overridable from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Clips shorter than this are rejected before motion analysis
    pub min_frames: usize,
    pub motion: MotionConfig,
    /// Peak smoothing uses the mean over ±peak_window pairs
    pub peak_window: usize,
    pub pose: PoseSamplerConfig,
    pub stick: StickConfig,
    pub silhouette: SilhouetteConfig,
    pub calibration: CalibrationConfig,
    pub fusion: FusionConfig,
    pub speed: SpeedConfig,
    pub confidence: ConfidenceConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_frames: 5,
            motion: MotionConfig::default(),
            peak_window: 2,
            pose: PoseSamplerConfig::default(),
            stick: StickConfig::default(),
            silhouette: SilhouetteConfig::default(),
            calibration: CalibrationConfig::default(),
            fusion: FusionConfig::default(),
            speed: SpeedConfig::default(),
            confidence: ConfidenceConfig::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use opencv::{
        core::{self, Mat, Rect, Scalar},
        imgproc,
    };

    /// Uniform single-channel 8-bit frame
    pub fn blank_frame(width: i32, height: i32, value: f64) -> Mat {
        Mat::new_rows_cols_with_default(height, width, core::CV_8UC1, Scalar::all(value)).unwrap()
    }

    /// Filled rectangle, drawn in place
    pub fn draw_rect(frame: &mut Mat, x: i32, y: i32, w: i32, h: i32, value: f64) {
        imgproc::rectangle(
            frame,
            Rect::new(x, y, w, h),
            Scalar::all(value),
            -1,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
    }

    /// Black frame with one white filled rectangle
    pub fn frame_with_rect(width: i32, height: i32, x: i32, y: i32, w: i32, h: i32) -> Mat {
        let mut frame = blank_frame(width, height, 0.0);
        draw_rect(&mut frame, x, y, w, h, 255.0);
        frame
    }
}
