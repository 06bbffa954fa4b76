// src/pose/mod.rs
//
// Pose-derived signals:
//   PoseEstimator (external model) → sampler → internal stream → body_measurement
//                                             ↘ overlay stream (display only)

pub mod body_measurement;
pub mod estimator;
pub mod landmark;
pub mod sampler;

pub use body_measurement::{measure_body, BodyMeasurements};
pub use estimator::{PoseEstimator, SharedPoseEstimator};
pub use landmark::{Keypoint, Landmark, LandmarkSet, Pose};
pub use sampler::{OverlayLandmarks, PoseFrame, PoseSampler, PoseSamplerConfig, PoseStreams};
