// src/pose/body_measurement.rs
//
// Pixel measurements of body dimensions with a known average physical size.
// Only genuinely detected records contribute; carried-forward copies would
// weight a single detection by how long the person went undetected.

use super::landmark::{distance, Landmark, LandmarkSet};
use super::sampler::PoseFrame;
use crate::analysis::calibration::{CalibrationConfig, CalibrationEstimate, CalibrationMethod};
use crate::analysis::stats::median;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyMeasurements {
    /// Median nose-to-ankle span
    pub height_px: Option<f64>,
    pub shoulder_width_px: Option<f64>,
    /// Median shoulder-to-wrist distance over both sides
    pub arm_length_px: Option<f64>,
}

impl BodyMeasurements {
    pub fn is_empty(&self) -> bool {
        self.height_px.is_none() && self.shoulder_width_px.is_none() && self.arm_length_px.is_none()
    }

    /// Convert each available median into a calibration estimate
    pub fn estimates(
        &self,
        player_height_cm: f64,
        config: &CalibrationConfig,
    ) -> Vec<CalibrationEstimate> {
        let weights = &config.weights;
        [
            (CalibrationMethod::PoseHeight, self.height_px, player_height_cm, weights.pose_height),
            (
                CalibrationMethod::PoseShoulder,
                self.shoulder_width_px,
                config.shoulder_width_cm,
                weights.pose_shoulder,
            ),
            (
                CalibrationMethod::PoseArm,
                self.arm_length_px,
                config.arm_length_cm,
                weights.pose_arm,
            ),
        ]
        .into_iter()
        .filter_map(|(method, px, cm, weight)| {
            px.map(|px| CalibrationEstimate::new(method, cm / px, weight))
        })
        .collect()
    }
}

pub fn measure_body<'a, I>(records: I, min_measurement_px: f64) -> BodyMeasurements
where
    I: IntoIterator<Item = &'a PoseFrame>,
{
    let mut heights = Vec::new();
    let mut shoulders = Vec::new();
    let mut arms = Vec::new();

    for record in records {
        let lm = &record.landmarks;

        if let Some(h) = body_height(lm) {
            heights.push(h);
        }

        let left_shoulder = lm.get(Landmark::LeftShoulder);
        let right_shoulder = lm.get(Landmark::RightShoulder);
        if let (Some(l), Some(r)) = (left_shoulder, right_shoulder) {
            shoulders.push(distance(l, r));
        }

        for (shoulder, wrist) in [
            (left_shoulder, lm.get(Landmark::LeftWrist)),
            (right_shoulder, lm.get(Landmark::RightWrist)),
        ] {
            if let (Some(s), Some(w)) = (shoulder, wrist) {
                arms.push(distance(s, w));
            }
        }
    }

    let keep = |values: Vec<f64>| -> Option<f64> {
        let valid: Vec<f64> = values
            .into_iter()
            .filter(|v| v.is_finite() && *v > min_measurement_px)
            .collect();
        median(&valid)
    };

    let measurements = BodyMeasurements {
        height_px: keep(heights),
        shoulder_width_px: keep(shoulders),
        arm_length_px: keep(arms),
    };

    debug!(
        "Body measurements: height={:?} shoulders={:?} arm={:?}",
        measurements.height_px, measurements.shoulder_width_px, measurements.arm_length_px
    );

    measurements
}

fn body_height(lm: &LandmarkSet) -> Option<f64> {
    let nose = lm.get(Landmark::Nose)?;
    let ankle_y = match (lm.get(Landmark::LeftAnkle), lm.get(Landmark::RightAnkle)) {
        (Some(l), Some(r)) => (l[1] + r[1]) / 2.0,
        (Some(a), None) | (None, Some(a)) => a[1],
        (None, None) => return None,
    };
    Some((nose[1] - ankle_y).abs() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(points: &[(Landmark, [f32; 2])], detected: bool) -> PoseFrame {
        let mut landmarks = LandmarkSet::new();
        for &(lm, p) in points {
            landmarks.insert(lm, p);
        }
        PoseFrame {
            landmarks,
            source_index: 0,
            detected,
        }
    }

    #[test]
    fn test_height_uses_ankle_midpoint_or_single_ankle() {
        let both = record(
            &[
                (Landmark::Nose, [50.0, 10.0]),
                (Landmark::LeftAnkle, [40.0, 200.0]),
                (Landmark::RightAnkle, [60.0, 210.0]),
            ],
            true,
        );
        let single = record(
            &[(Landmark::Nose, [50.0, 10.0]), (Landmark::RightAnkle, [60.0, 190.0])],
            true,
        );

        assert_eq!(measure_body([&both], 1.0).height_px, Some(195.0));
        assert_eq!(measure_body([&single], 1.0).height_px, Some(180.0));
    }

    #[test]
    fn test_both_arms_contribute_and_median_is_taken() {
        let r = record(
            &[
                (Landmark::LeftShoulder, [0.0, 0.0]),
                (Landmark::RightShoulder, [40.0, 0.0]),
                (Landmark::LeftWrist, [0.0, 60.0]),
                (Landmark::RightWrist, [40.0, 50.0]),
            ],
            true,
        );
        let m = measure_body([&r], 1.0);
        assert_eq!(m.shoulder_width_px, Some(40.0));
        assert_eq!(m.arm_length_px, Some(55.0));
        assert!(m.height_px.is_none());
    }

    #[test]
    fn test_degenerate_measurements_are_dropped() {
        let r = record(
            &[
                (Landmark::LeftShoulder, [10.0, 10.0]),
                (Landmark::RightShoulder, [10.0, 10.0]),
            ],
            true,
        );
        let m = measure_body([&r], 1.0);
        assert!(m.is_empty());
    }

    #[test]
    fn test_estimates_follow_weight_order() {
        let m = BodyMeasurements {
            height_px: Some(366.0),
            shoulder_width_px: Some(82.0),
            arm_length_px: None,
        };
        let config = CalibrationConfig::default();
        let estimates = m.estimates(183.0, &config);

        assert_eq!(estimates.len(), 2);
        assert_eq!(estimates[0].method, CalibrationMethod::PoseHeight);
        assert!((estimates[0].cm_per_pixel - 0.5).abs() < 1e-9);
        assert_eq!(estimates[1].method, CalibrationMethod::PoseShoulder);
        assert!(estimates[0].weight > estimates[1].weight);
    }
}
