// src/inference.rs
//
// ONNX Runtime backed pose estimator for MoveNet-style single-person models.
// Input:  [1, S, S, 3] f32, RGB, 0-255
// Output: [1, 1, 17, 3] as (y, x, score), normalized coordinates

use crate::pose::{Keypoint, Landmark, Pose, PoseEstimator};
use crate::preprocessing::{frame_to_rgb, preprocess_pose_input};
use crate::types::PoseModelConfig;
use anyhow::{Context, Result};
use opencv::core::Mat;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

pub struct OnnxPoseEstimator {
    session: Session,
    input_size: usize,
    min_pose_score: f32,
}

impl OnnxPoseEstimator {
    pub fn new(config: &PoseModelConfig) -> Result<Self> {
        let model_path = config
            .model_path
            .as_deref()
            .context("No pose model path configured")?;

        info!("Initializing pose inference engine");
        info!("Model path: {}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .with_inter_threads(1)?
            .commit_from_file(model_path)
            .context("Failed to load pose model")?;

        info!("✓ Pose inference engine initialized");

        Ok(Self {
            session,
            input_size: config.input_size,
            min_pose_score: config.min_pose_score,
        })
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1, self.input_size, self.input_size, 3];
        let input_value = ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .context("Pose inference failed")?;

        let (output_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        debug!("Pose model output shape: {:?}", output_shape);

        Ok(data.to_vec())
    }
}

impl PoseEstimator for OnnxPoseEstimator {
    fn detect(&mut self, image: &Mat) -> Result<Option<Pose>> {
        let (rgb, width, height) = frame_to_rgb(image)?;
        let input = preprocess_pose_input(&rgb, width, height, self.input_size)?;
        let output = self.infer(input)?;
        Ok(decode_movenet(&output, self.min_pose_score))
    }
}

/// Decode a flat (y, x, score) × 17 output. Returns None when no landmark
/// reaches `min_pose_score`.
pub fn decode_movenet(output: &[f32], min_pose_score: f32) -> Option<Pose> {
    if output.len() < Landmark::COUNT * 3 {
        return None;
    }

    let mut keypoints = [Keypoint::default(); Landmark::COUNT];
    for (i, kp) in keypoints.iter_mut().enumerate() {
        let y = output[i * 3];
        let x = output[i * 3 + 1];
        let score = output[i * 3 + 2];
        *kp = Keypoint::new(x, y, score);
    }

    let pose = Pose::new(keypoints);
    (pose.best_visibility() >= min_pose_score).then_some(pose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_swaps_to_xy() {
        let mut output = vec![0.0f32; 51];
        output[0] = 0.2; // nose y
        output[1] = 0.7; // nose x
        output[2] = 0.9;

        let pose = decode_movenet(&output, 0.1).unwrap();
        let nose = pose.get(Landmark::Nose);
        assert_eq!((nose.x, nose.y, nose.visibility), (0.7, 0.2, 0.9));
    }

    #[test]
    fn test_decode_rejects_empty_scene() {
        let output = vec![0.05f32; 51];
        assert!(decode_movenet(&output, 0.1).is_none());
        assert!(decode_movenet(&output[..10], 0.0).is_none());
    }
}
