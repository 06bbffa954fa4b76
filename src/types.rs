// src/types.rs

use crate::analysis::AnalyzerConfig;
use crate::pose::OverlayLandmarks;
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub analysis: AnalyzerConfig,
    pub pose: PoseModelConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
    /// Frames taller than this are downscaled, preserving aspect ratio
    pub max_frame_height: i32,
    /// Used when the container reports no (or a non-positive) frame rate
    pub default_fps: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            input_dir: "videos".to_string(),
            output_dir: "results".to_string(),
            max_frame_height: 720,
            default_fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseModelConfig {
    /// ONNX single-person pose model (MoveNet layout). None disables pose.
    pub model_path: Option<String>,
    pub num_threads: usize,
    pub input_size: usize,
    /// Below this best-landmark score the frame counts as "no person"
    pub min_pose_score: f32,
}

impl Default for PoseModelConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            num_threads: 2,
            input_size: 192,
            min_pose_score: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub max_concurrent_analyses: usize,
    pub reference_length_cm: Option<f64>,
    pub player_height_cm: Option<f64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyses: 2,
            reference_length_cm: None,
            player_height_cm: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "swing_speed=info,ort=warn".to_string(),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("cannot open or decode video source: {0}")]
    InvalidSource(String),
    #[error("no frames could be read from: {0}")]
    EmptySource(String),
    #[error("video too short: only {frames} frames, at least {required} are required")]
    TooShort { frames: usize, required: usize },
    #[error("vision backend failure: {0}")]
    Vision(#[from] opencv::Error),
}

impl AnalysisError {
    /// Stable label reported to callers alongside the message
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisError::InvalidSource(_) => "INVALID_SOURCE",
            AnalysisError::EmptySource(_) => "EMPTY_SOURCE",
            AnalysisError::TooShort { .. } => "TOO_SHORT",
            AnalysisError::Vision(_) => "VISION_BACKEND",
        }
    }
}

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwingAnalysis {
    pub speed_kmh: f64,
    pub speed_mph: f64,
    pub confidence: f64,
    pub per_frame_speed_kmh: Vec<f64>,
    pub fps: f64,
    pub overlay_landmarks: OverlayLandmarks,
    pub diagnostics: AnalysisDiagnostics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDiagnostics {
    pub peak_index: usize,
    pub cm_per_pixel: f64,
    pub calibration_method: String,
    pub wrist_speed_px_per_sec: Option<f64>,
    pub frame_count: usize,
    pub frame_width: i32,
    pub frame_height: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "video:\n  input_dir: clips\nservice:\n  reference_length_cm: 160.0\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.video.input_dir, "clips");
        assert_eq!(config.video.max_frame_height, 720);
        assert_eq!(config.service.reference_length_cm, Some(160.0));
        assert_eq!(config.analysis.speed.lever_ratio, 1.7);
    }

    #[test]
    fn test_error_labels() {
        let err = AnalysisError::TooShort {
            frames: 3,
            required: 5,
        };
        assert_eq!(err.label(), "TOO_SHORT");
        assert!(err.to_string().contains("only 3 frames"));
    }
}
