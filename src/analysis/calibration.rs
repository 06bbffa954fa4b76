// src/analysis/calibration.rs
//
// Physical scale (cm per pixel) from several independent, individually
// unreliable estimates.
//
// Sources, by trust weight:
//   pose_height 0.90 > stick_flow 0.85 > pose_shoulder 0.75 = stick_ridge 0.75
//   > stick_edge 0.65 > pose_arm 0.60 > player_height 0.40
//
// Fusion compares every estimate with the median of all of them. When at
// least two fall inside the agreement band, their weighted mean is used and
// labeled with the most trusted agreeing source. Otherwise the most trusted
// estimate is used as-is. No estimates at all → a frame-width guess.

use super::stats::median;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodWeights {
    pub pose_height: f64,
    pub stick_flow: f64,
    pub pose_shoulder: f64,
    pub stick_ridge: f64,
    pub stick_edge: f64,
    pub pose_arm: f64,
    pub player_height: f64,
}

impl Default for MethodWeights {
    fn default() -> Self {
        Self {
            pose_height: 0.90,
            stick_flow: 0.85,
            pose_shoulder: 0.75,
            stick_ridge: 0.75,
            stick_edge: 0.65,
            pose_arm: 0.60,
            player_height: 0.40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Average senior stick, used when the caller gives no reference length
    pub stick_length_cm: f64,
    /// Average player height, used when the caller gives none
    pub player_height_cm: f64,
    pub shoulder_width_cm: f64,
    pub arm_length_cm: f64,
    /// Pose measurements at or below this are discarded
    pub min_measurement_px: f64,
    pub weights: MethodWeights,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            stick_length_cm: 155.0,
            player_height_cm: 183.0,
            shoulder_width_cm: 41.0,
            arm_length_cm: 60.0,
            min_measurement_px: 1.0,
            weights: MethodWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Agreeing estimates lie strictly within (1 - band, 1 + band) of the median
    pub agreement_band: f64,
    /// Fallback assumes the stick spans this fraction of the frame width
    pub fallback_width_ratio: f64,
    pub min_agreeing: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            agreement_band: 0.3,
            fallback_width_ratio: 0.35,
            min_agreeing: 2,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    PoseHeight,
    PoseShoulder,
    PoseArm,
    StickFlow,
    StickRidge,
    StickEdge,
    PlayerHeight,
    Fallback,
}

impl CalibrationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationMethod::PoseHeight => "pose_height",
            CalibrationMethod::PoseShoulder => "pose_shoulder",
            CalibrationMethod::PoseArm => "pose_arm",
            CalibrationMethod::StickFlow => "stick_flow",
            CalibrationMethod::StickRidge => "stick_ridge",
            CalibrationMethod::StickEdge => "stick_edge",
            CalibrationMethod::PlayerHeight => "player_height",
            CalibrationMethod::Fallback => "fallback",
        }
    }

    /// Derived from the stick length (and so from a caller reference length)
    pub fn is_stick_based(&self) -> bool {
        matches!(
            self,
            CalibrationMethod::StickFlow | CalibrationMethod::StickRidge | CalibrationMethod::StickEdge
        )
    }

    pub fn is_pose_based(&self) -> bool {
        matches!(
            self,
            CalibrationMethod::PoseHeight | CalibrationMethod::PoseShoulder | CalibrationMethod::PoseArm
        )
    }
}

impl fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationEstimate {
    pub method: CalibrationMethod,
    pub cm_per_pixel: f64,
    pub weight: f64,
}

impl CalibrationEstimate {
    pub fn new(method: CalibrationMethod, cm_per_pixel: f64, weight: f64) -> Self {
        Self {
            method,
            cm_per_pixel,
            weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedCalibration {
    pub cm_per_pixel: f64,
    pub method: CalibrationMethod,
    /// How many estimates entered the agreeing mean (0 for single/fallback)
    pub agreeing: usize,
}

// ============================================================================
// ESTIMATE COLLECTION
// ============================================================================

/// Raw pixel measurements gathered for one clip
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleMeasurements {
    pub stick_flow_px: Option<f64>,
    pub stick_ridge_px: Option<f64>,
    pub stick_edge_px: Option<f64>,
    pub player_height_px: Option<f64>,
}

/// Turn stick and silhouette lengths into estimates, in detector order
pub fn collect_estimates(
    measurements: &ScaleMeasurements,
    stick_cm: f64,
    player_height_cm: f64,
    config: &CalibrationConfig,
) -> Vec<CalibrationEstimate> {
    let w = &config.weights;
    [
        (CalibrationMethod::StickFlow, measurements.stick_flow_px, stick_cm, w.stick_flow),
        (CalibrationMethod::StickRidge, measurements.stick_ridge_px, stick_cm, w.stick_ridge),
        (CalibrationMethod::StickEdge, measurements.stick_edge_px, stick_cm, w.stick_edge),
        (
            CalibrationMethod::PlayerHeight,
            measurements.player_height_px,
            player_height_cm,
            w.player_height,
        ),
    ]
    .into_iter()
    .filter_map(|(method, px, cm, weight)| {
        px.filter(|px| *px > 0.0)
            .map(|px| CalibrationEstimate::new(method, cm / px, weight))
    })
    .collect()
}

// ============================================================================
// FUSION
// ============================================================================

pub fn fuse_estimates(
    estimates: &[CalibrationEstimate],
    stick_cm: f64,
    frame_width: i32,
    config: &FusionConfig,
) -> FusedCalibration {
    let usable: Vec<CalibrationEstimate> = estimates
        .iter()
        .copied()
        .filter(|e| e.cm_per_pixel.is_finite() && e.cm_per_pixel > 0.0)
        .collect();

    let Some(primary) = most_trusted(&usable) else {
        let fallback_px = (frame_width.max(1) as f64) * config.fallback_width_ratio;
        let cm_per_pixel = stick_cm / fallback_px;
        info!("Calibration fallback: {:.4} cm/px", cm_per_pixel);
        return FusedCalibration {
            cm_per_pixel,
            method: CalibrationMethod::Fallback,
            agreeing: 0,
        };
    };

    let values: Vec<f64> = usable.iter().map(|e| e.cm_per_pixel).collect();
    // usable is non-empty here
    let median_cm = median(&values).unwrap_or(primary.cm_per_pixel);

    let lo = 1.0 - config.agreement_band;
    let hi = 1.0 + config.agreement_band;
    let agreeing: Vec<CalibrationEstimate> = usable
        .iter()
        .copied()
        .filter(|e| {
            let ratio = e.cm_per_pixel / median_cm;
            ratio > lo && ratio < hi
        })
        .collect();

    debug!(
        "Calibration: {} estimates, median {:.4} cm/px, {} agreeing",
        usable.len(),
        median_cm,
        agreeing.len()
    );

    if agreeing.len() >= config.min_agreeing.max(2) {
        let total_weight: f64 = agreeing.iter().map(|e| e.weight).sum();
        let fused = agreeing.iter().map(|e| e.cm_per_pixel * e.weight).sum::<f64>() / total_weight;
        // agreeing is non-empty here
        let label = most_trusted(&agreeing).map_or(primary.method, |e| e.method);
        return FusedCalibration {
            cm_per_pixel: fused,
            method: label,
            agreeing: agreeing.len(),
        };
    }

    FusedCalibration {
        cm_per_pixel: primary.cm_per_pixel,
        method: primary.method,
        agreeing: 0,
    }
}

/// Highest weight; the earlier estimate wins ties
fn most_trusted(estimates: &[CalibrationEstimate]) -> Option<CalibrationEstimate> {
    estimates.iter().copied().fold(None, |best, e| match best {
        Some(b) if e.weight <= b.weight => Some(b),
        _ => Some(e),
    })
}
