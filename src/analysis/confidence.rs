// src/analysis/confidence.rs
//
// Composite confidence in [0, 1] from four partial scores:
//   peak distinctness, calibration quality, video quality, pose quality.
// Pose quality only takes part when at least one valid pose record exists;
// otherwise its weight is redistributed over the other three.

use super::calibration::CalibrationMethod;
use super::speed::round_to;
use super::stats::mean;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub peak: f64,
    pub calibration: f64,
    pub video: f64,
    pub pose: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodScores {
    pub pose_height: f64,
    pub stick_flow: f64,
    pub pose_shoulder: f64,
    pub pose_arm: f64,
    pub stick_ridge: f64,
    pub stick_edge: f64,
    pub player_height: f64,
    pub fallback: f64,
}

impl Default for MethodScores {
    fn default() -> Self {
        Self {
            pose_height: 0.95,
            stick_flow: 0.90,
            pose_shoulder: 0.85,
            pose_arm: 0.80,
            stick_ridge: 0.80,
            stick_edge: 0.70,
            player_height: 0.50,
            fallback: 0.20,
        }
    }
}

impl MethodScores {
    pub fn score(&self, method: CalibrationMethod) -> f64 {
        match method {
            CalibrationMethod::PoseHeight => self.pose_height,
            CalibrationMethod::StickFlow => self.stick_flow,
            CalibrationMethod::PoseShoulder => self.pose_shoulder,
            CalibrationMethod::PoseArm => self.pose_arm,
            CalibrationMethod::StickRidge => self.stick_ridge,
            CalibrationMethod::StickEdge => self.stick_edge,
            CalibrationMethod::PlayerHeight => self.player_height,
            CalibrationMethod::Fallback => self.fallback,
        }
    }
}

/// `score` is granted once the measured value reaches `min`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tier {
    pub min: f64,
    pub score: f64,
}

fn tier_score(tiers: &[Tier], value: f64) -> f64 {
    tiers
        .iter()
        .find(|t| value >= t.min)
        .map_or(0.0, |t| t.score)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub with_pose: ComponentWeights,
    /// `pose` is ignored here
    pub without_pose: ComponentWeights,
    pub method_scores: MethodScores,
    /// Reference length bonus when it fed the chosen method
    pub reference_bonus_direct: f64,
    pub reference_bonus_indirect: f64,
    /// Highest threshold first
    pub frame_count_tiers: Vec<Tier>,
    pub fps_tiers: Vec<Tier>,
    pub frame_height_tiers: Vec<Tier>,
    /// Pose score = coverage × this, capped at 1
    pub pose_coverage_gain: f64,
    pub wrist_bonus: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            with_pose: ComponentWeights {
                peak: 0.30,
                calibration: 0.35,
                video: 0.15,
                pose: 0.20,
            },
            without_pose: ComponentWeights {
                peak: 0.40,
                calibration: 0.40,
                video: 0.20,
                pose: 0.0,
            },
            method_scores: MethodScores::default(),
            reference_bonus_direct: 0.10,
            reference_bonus_indirect: 0.05,
            frame_count_tiers: vec![Tier { min: 30.0, score: 0.33 }, Tier { min: 10.0, score: 0.15 }],
            fps_tiers: vec![Tier { min: 30.0, score: 0.34 }, Tier { min: 15.0, score: 0.17 }],
            frame_height_tiers: vec![
                Tier { min: 480.0, score: 0.33 },
                Tier { min: 240.0, score: 0.15 },
            ],
            pose_coverage_gain: 1.5,
            wrist_bonus: 0.2,
        }
    }
}

// ============================================================================
// SCORER
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct PoseQuality {
    /// Fraction of frames with a present internal record
    pub coverage: f64,
    pub has_wrist_speed: bool,
}

#[derive(Debug, Clone)]
pub struct ConfidenceInputs<'a> {
    pub series: &'a [f64],
    pub peak_index: usize,
    pub method: CalibrationMethod,
    pub reference_provided: bool,
    pub fps: f64,
    pub frame_count: usize,
    pub frame_height: i32,
    /// None when no valid pose record exists
    pub pose: Option<PoseQuality>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBreakdown {
    pub peak: f64,
    pub calibration: f64,
    pub video: f64,
    pub pose: Option<f64>,
    /// Two decimals
    pub total: f64,
}

pub struct ConfidenceScorer<'a> {
    config: &'a ConfidenceConfig,
}

impl<'a> ConfidenceScorer<'a> {
    pub fn new(config: &'a ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn peak_score(&self, series: &[f64], peak_index: usize) -> f64 {
        let Some(mean_mag) = mean(series) else {
            return 0.0;
        };
        if mean_mag <= 0.0 {
            return 0.0;
        }
        let peak = series.get(peak_index).copied().unwrap_or(0.0);
        ((peak / mean_mag - 1.0) / 4.0).clamp(0.0, 1.0)
    }

    pub fn calibration_score(&self, method: CalibrationMethod, reference_provided: bool) -> f64 {
        let base = self.config.method_scores.score(method);
        if !reference_provided {
            return base;
        }
        let bonus = if method.is_stick_based() || method == CalibrationMethod::Fallback {
            self.config.reference_bonus_direct
        } else {
            self.config.reference_bonus_indirect
        };
        (base + bonus).min(1.0)
    }

    pub fn video_score(&self, frame_count: usize, fps: f64, frame_height: i32) -> f64 {
        let sum = tier_score(&self.config.frame_count_tiers, frame_count as f64)
            + tier_score(&self.config.fps_tiers, fps)
            + tier_score(&self.config.frame_height_tiers, frame_height as f64);
        sum.clamp(0.0, 1.0)
    }

    pub fn pose_score(&self, quality: PoseQuality) -> f64 {
        let mut score = (quality.coverage * self.config.pose_coverage_gain).min(1.0);
        if quality.has_wrist_speed {
            score = (score + self.config.wrist_bonus).min(1.0);
        }
        score
    }

    pub fn score(&self, inputs: &ConfidenceInputs<'_>) -> ConfidenceBreakdown {
        let peak = self.peak_score(inputs.series, inputs.peak_index);
        let calibration = self.calibration_score(inputs.method, inputs.reference_provided);
        let video = self.video_score(inputs.frame_count, inputs.fps, inputs.frame_height);
        let pose = inputs.pose.map(|q| self.pose_score(q));

        let raw = match pose {
            Some(pose) => {
                let w = &self.config.with_pose;
                w.peak * peak + w.calibration * calibration + w.video * video + w.pose * pose
            }
            None => {
                let w = &self.config.without_pose;
                w.peak * peak + w.calibration * calibration + w.video * video
            }
        };
        let total = round_to(raw.clamp(0.0, 1.0), 2);

        debug!(
            "Confidence: peak={:.2} calibration={:.2} video={:.2} pose={:?} → {:.2}",
            peak, calibration, video, pose, total
        );

        ConfidenceBreakdown {
            peak,
            calibration,
            video,
            pose,
            total,
        }
    }
}
