// src/pose/sampler.rs
//
// Runs the pose estimator over two sampling grids and builds:
//   - the internal stream: body landmarks in pixels, one slot per frame,
//     forward-filled from the last valid detection
//   - the overlay stream: all landmarks, normalized, one slot per overlay
//     sample, never filled
//
// Indices shared by both grids are inferred once.

use super::estimator::PoseEstimator;
use super::landmark::{Landmark, LandmarkSet, Pose};
use opencv::{core::Mat, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSamplerConfig {
    /// Internal stride = max(1, frames / internal_target_samples)
    pub internal_target_samples: usize,
    pub overlay_step: usize,
    pub internal_min_visibility: f32,
    pub overlay_min_visibility: f32,
    /// Minimum passing landmarks for a record to count as valid
    pub min_landmarks: usize,
    pub overlay_decimals: i32,
}

impl Default for PoseSamplerConfig {
    fn default() -> Self {
        Self {
            internal_target_samples: 50,
            overlay_step: 3,
            internal_min_visibility: 0.5,
            overlay_min_visibility: 0.3,
            min_landmarks: 4,
            overlay_decimals: 4,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// Internal pose record for one frame (pixel coordinates)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseFrame {
    pub landmarks: LandmarkSet,
    /// Frame index the landmarks were actually detected on
    pub source_index: usize,
    /// False when carried forward from an earlier detection
    pub detected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLandmarks {
    pub step: usize,
    /// `frames[k]` describes frame index `k * step`
    pub frames: Vec<Option<LandmarkSet>>,
}

impl OverlayLandmarks {
    pub fn empty(step: usize) -> Self {
        Self {
            step,
            frames: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoseStreams {
    pub internal: Vec<Option<PoseFrame>>,
    pub overlay: OverlayLandmarks,
    /// Estimator calls made to build both streams
    pub inferences: usize,
}

impl PoseStreams {
    /// Streams for a clip analyzed without pose estimation
    pub fn absent(frame_count: usize, overlay_step: usize) -> Self {
        Self {
            internal: vec![None; frame_count],
            overlay: OverlayLandmarks::empty(overlay_step),
            inferences: 0,
        }
    }

    pub fn has_pose(&self) -> bool {
        self.internal.iter().any(|r| r.is_some())
    }

    /// Fraction of frames holding a record (detected or carried forward)
    pub fn coverage(&self) -> f64 {
        if self.internal.is_empty() {
            return 0.0;
        }
        let present = self.internal.iter().filter(|r| r.is_some()).count();
        present as f64 / self.internal.len() as f64
    }

    pub fn detected_frames(&self) -> impl Iterator<Item = &PoseFrame> {
        self.internal.iter().flatten().filter(|r| r.detected)
    }
}

// ============================================================================
// SAMPLER
// ============================================================================

pub struct PoseSampler {
    config: PoseSamplerConfig,
}

impl PoseSampler {
    pub fn new(config: PoseSamplerConfig) -> Self {
        Self { config }
    }

    pub fn internal_step(&self, frame_count: usize) -> usize {
        (frame_count / self.config.internal_target_samples.max(1)).max(1)
    }

    pub fn overlay_step(&self) -> usize {
        self.config.overlay_step.max(1)
    }

    pub fn sample(&self, images: &[Mat], estimator: &mut dyn PoseEstimator) -> PoseStreams {
        let total = images.len();
        let internal_step = self.internal_step(total);
        let overlay_step = self.overlay_step();

        let grid: BTreeSet<usize> = (0..total)
            .step_by(internal_step)
            .chain((0..total).step_by(overlay_step))
            .collect();

        let mut detections: Vec<Option<Pose>> = vec![None; total];
        let mut failures = 0usize;
        for &idx in &grid {
            match estimator.detect(&images[idx]) {
                Ok(pose) => detections[idx] = pose,
                Err(e) => {
                    failures += 1;
                    debug!("Pose detection failed on frame {}: {:#}", idx, e);
                }
            }
        }
        if failures > 0 {
            warn!(
                "Pose estimator failed on {}/{} sampled frames",
                failures,
                grid.len()
            );
        }

        let internal = self.build_internal(images, &detections, internal_step);
        let overlay = self.build_overlay(&detections, overlay_step);

        info!(
            "Pose sampling: {} inferences (internal step {}, overlay step {}), {} valid internal records",
            grid.len(),
            internal_step,
            overlay_step,
            internal.iter().flatten().filter(|r| r.detected).count()
        );

        PoseStreams {
            internal,
            overlay,
            inferences: grid.len(),
        }
    }

    fn build_internal(
        &self,
        images: &[Mat],
        detections: &[Option<Pose>],
        step: usize,
    ) -> Vec<Option<PoseFrame>> {
        let mut records = Vec::with_capacity(detections.len());
        let mut last_valid: Option<PoseFrame> = None;

        for (idx, detection) in detections.iter().enumerate() {
            let fresh = if idx % step == 0 {
                detection.as_ref().and_then(|pose| {
                    let (w, h) = (images[idx].cols() as f32, images[idx].rows() as f32);
                    let landmarks = LandmarkSet::from_pose(
                        pose,
                        &Landmark::BODY,
                        self.config.internal_min_visibility,
                        |x, y| [x * w, y * h],
                    );
                    (landmarks.len() >= self.config.min_landmarks).then_some(PoseFrame {
                        landmarks,
                        source_index: idx,
                        detected: true,
                    })
                })
            } else {
                None
            };

            match fresh {
                Some(record) => {
                    last_valid = Some(record);
                    records.push(Some(record));
                }
                None => records.push(last_valid.map(|r| PoseFrame {
                    detected: false,
                    ..r
                })),
            }
        }

        records
    }

    fn build_overlay(&self, detections: &[Option<Pose>], step: usize) -> OverlayLandmarks {
        let scale = 10f32.powi(self.config.overlay_decimals);
        let frames = detections
            .iter()
            .step_by(step)
            .map(|detection| {
                detection.as_ref().and_then(|pose| {
                    let landmarks = LandmarkSet::from_pose(
                        pose,
                        &Landmark::ALL,
                        self.config.overlay_min_visibility,
                        |x, y| {
                            [
                                (x.clamp(0.0, 1.0) * scale).round() / scale,
                                (y.clamp(0.0, 1.0) * scale).round() / scale,
                            ]
                        },
                    );
                    (landmarks.len() >= self.config.min_landmarks).then_some(landmarks)
                })
            })
            .collect();

        OverlayLandmarks { step, frames }
    }
}
