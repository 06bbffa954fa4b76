// src/analysis/swing_pipeline.rs
//
// Orchestrator that wires motion analysis, pose sampling, scale calibration,
// speed synthesis and confidence scoring into one call.
//
// Single entry point per clip: analyze_file() or analyze_frames().
// Everything derived from the clip is owned by the call; the analyzer itself
// only holds configuration and the shared metrics handle.
//
// Only three things abort an analysis: an unreadable source, a clip too
// short to have a motion peak, and an OpenCV failure in the motion stage.
// Every calibration source and the pose estimator degrade to "no estimate".

use super::calibration::{collect_estimates, fuse_estimates, CalibrationEstimate, FusedCalibration, ScaleMeasurements};
use super::confidence::{ConfidenceInputs, ConfidenceScorer, PoseQuality};
use super::motion_field::MotionFieldEstimator;
use super::peak::{locate_peak, PeakEvent};
use super::silhouette::detect_player_height;
use super::speed::{synthesize, wrist_speed};
use super::stick_detector::StickDetector;
use super::AnalyzerConfig;
use crate::pipeline::{notify, AnalysisMetrics, ProgressSink, ProgressStage, StageClock, StageTimings};
use crate::pose::{measure_body, PoseEstimator, PoseSampler, PoseStreams};
use crate::types::{AnalysisDiagnostics, AnalysisError, SwingAnalysis};
use crate::video_processor::{FrameSequence, VideoProcessor};
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// INPUT
// ============================================================================

/// Optional per-call inputs. Non-positive lengths count as absent.
#[derive(Default, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    /// Known stick length; replaces the average stick for stick-based scales
    pub reference_length_cm: Option<f64>,
    /// Known player height; replaces the average player for body-height scales
    pub player_height_cm: Option<f64>,
    pub progress: Option<&'a dyn ProgressSink>,
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct SwingAnalyzer {
    config: AnalyzerConfig,
    metrics: AnalysisMetrics,
}

impl SwingAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_metrics(config, AnalysisMetrics::new())
    }

    pub fn with_metrics(config: AnalyzerConfig, metrics: AnalysisMetrics) -> Self {
        Self { config, metrics }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &AnalysisMetrics {
        &self.metrics
    }

    /// Load `path` and analyze it. Color frames are only decoded when an
    /// estimator is supplied.
    pub fn analyze_file(
        &self,
        path: &Path,
        video: &VideoProcessor,
        estimator: Option<&mut dyn PoseEstimator>,
        request: &AnalysisRequest<'_>,
    ) -> Result<SwingAnalysis, AnalysisError> {
        let mut clock = StageClock::start();
        let frames = match video.load_clip(path, estimator.is_some()) {
            Ok(frames) => frames,
            Err(e) => {
                self.metrics.inc(&self.metrics.analyses_failed);
                return Err(e);
            }
        };
        notify(request.progress, ProgressStage::FramesLoaded);
        let load_us = clock.lap();

        self.run(&frames, estimator, request, clock, load_us)
    }

    /// Analyze an already decoded clip
    pub fn analyze_frames(
        &self,
        frames: &FrameSequence,
        estimator: Option<&mut dyn PoseEstimator>,
        request: &AnalysisRequest<'_>,
    ) -> Result<SwingAnalysis, AnalysisError> {
        notify(request.progress, ProgressStage::FramesLoaded);
        self.run(frames, estimator, request, StageClock::start(), 0)
    }

    fn run(
        &self,
        frames: &FrameSequence,
        estimator: Option<&mut dyn PoseEstimator>,
        request: &AnalysisRequest<'_>,
        clock: StageClock,
        load_us: u64,
    ) -> Result<SwingAnalysis, AnalysisError> {
        let result = self.analyze(frames, estimator, request, clock, load_us);
        if let Err(e) = &result {
            self.metrics.inc(&self.metrics.analyses_failed);
            warn!("Analysis failed [{}]: {}", e.label(), e);
        }
        result
    }

    fn analyze(
        &self,
        frames: &FrameSequence,
        estimator: Option<&mut dyn PoseEstimator>,
        request: &AnalysisRequest<'_>,
        mut clock: StageClock,
        load_us: u64,
    ) -> Result<SwingAnalysis, AnalysisError> {
        let cfg = &self.config;
        let frame_count = frames.len();
        let required = cfg.min_frames.max(2);
        if frame_count < required {
            return Err(AnalysisError::TooShort {
                frames: frame_count,
                required,
            });
        }

        // ── Motion ──
        let series = MotionFieldEstimator::new(&cfg.motion).magnitude_series(&frames.gray)?;
        let peak = locate_peak(&series, cfg.peak_window).ok_or(AnalysisError::TooShort {
            frames: frame_count,
            required,
        })?;
        info!(
            "Peak motion at pair {}: raw {:.2}, smoothed {:.2} px/frame",
            peak.index, peak.raw, peak.smoothed
        );
        notify(request.progress, ProgressStage::MotionAnalyzed);
        let motion_us = clock.lap();

        // ── Pose ──
        let sampler = PoseSampler::new(cfg.pose.clone());
        let streams = match estimator {
            Some(estimator) => sampler.sample(frames.pose_images(), estimator),
            None => PoseStreams::absent(frame_count, sampler.overlay_step()),
        };
        self.metrics
            .add(&self.metrics.pose_inferences, streams.inferences as u64);
        notify(request.progress, ProgressStage::PoseSampled);
        let pose_us = clock.lap();

        // ── Calibration ──
        let reference_cm = positive(request.reference_length_cm);
        let fused = self.calibrate(frames, &series, &peak, &streams, request, reference_cm);
        notify(request.progress, ProgressStage::Calibrated);
        let calibration_us = clock.lap();

        // ── Speed & confidence ──
        let wrist_px_s = wrist_speed(&streams.internal, peak.index, frames.fps, cfg.speed.wrist_window);
        let report = synthesize(&peak, &series, frames.fps, fused.cm_per_pixel, wrist_px_s, &cfg.speed);

        let pose_quality = streams.has_pose().then(|| PoseQuality {
            coverage: streams.coverage(),
            has_wrist_speed: wrist_px_s.is_some(),
        });
        let confidence = ConfidenceScorer::new(&cfg.confidence).score(&ConfidenceInputs {
            series: &series,
            peak_index: peak.index,
            method: fused.method,
            reference_provided: reference_cm.is_some(),
            fps: frames.fps,
            frame_count,
            frame_height: frames.height(),
            pose: pose_quality,
        });

        let timings = StageTimings {
            load_us,
            motion_us,
            pose_us,
            calibration_us,
            total_us: clock.total(),
        };
        self.metrics.record_success(frame_count, &timings);
        info!(
            "Swing: {:.1} km/h ({:.1} mph), confidence {:.2}, scale {:.4} cm/px via {}",
            report.speed_kmh, report.speed_mph, confidence.total, fused.cm_per_pixel, fused.method
        );
        debug!("Stage timings: {:?}", timings);
        notify(request.progress, ProgressStage::Finished);

        Ok(SwingAnalysis {
            speed_kmh: report.speed_kmh,
            speed_mph: report.speed_mph,
            confidence: confidence.total,
            per_frame_speed_kmh: report.per_pair_kmh,
            fps: frames.fps,
            overlay_landmarks: streams.overlay,
            diagnostics: AnalysisDiagnostics {
                peak_index: peak.index,
                cm_per_pixel: fused.cm_per_pixel,
                calibration_method: fused.method.as_str().to_string(),
                wrist_speed_px_per_sec: wrist_px_s,
                frame_count,
                frame_width: frames.width(),
                frame_height: frames.height(),
            },
        })
    }

    /// Gather every available scale estimate and fuse them.
    /// Order: pose (height, shoulder, arm), stick (flow, ridge, edge),
    /// silhouette. Equal weights resolve to the earlier source.
    fn calibrate(
        &self,
        frames: &FrameSequence,
        series: &[f64],
        peak: &PeakEvent,
        streams: &PoseStreams,
        request: &AnalysisRequest<'_>,
        reference_cm: Option<f64>,
    ) -> FusedCalibration {
        let cfg = &self.config;
        let stick_cm = reference_cm.unwrap_or(cfg.calibration.stick_length_cm);
        let player_cm = positive(request.player_height_cm).unwrap_or(cfg.calibration.player_height_cm);

        let body = measure_body(streams.detected_frames(), cfg.calibration.min_measurement_px);
        let mut estimates: Vec<CalibrationEstimate> = body.estimates(player_cm, &cfg.calibration);

        let detector = StickDetector::new(&cfg.stick, &cfg.motion);
        let mut measurements = ScaleMeasurements {
            stick_flow_px: detector.from_flow(&frames.gray, series, peak.index),
            stick_ridge_px: detector.from_ridges(&frames.gray, peak.index),
            stick_edge_px: detector.from_edges(&frames.gray, peak.index),
            player_height_px: None,
        };
        if estimates.is_empty() {
            measurements.player_height_px = detect_player_height(&frames.gray, &cfg.silhouette);
        }
        debug!("Scale measurements: {:?}", measurements);

        estimates.extend(collect_estimates(&measurements, stick_cm, player_cm, &cfg.calibration));
        for e in &estimates {
            debug!("  estimate {}: {:.4} cm/px (weight {:.2})", e.method, e.cm_per_pixel, e.weight);
        }

        fuse_estimates(&estimates, stick_cm, frames.width(), &cfg.fusion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{blank_frame, frame_with_rect};
    use crate::analysis::CalibrationMethod;
    use crate::pose::{Keypoint, Landmark, Pose};
    use anyhow::Result;
    use opencv::core::Mat;
    use std::sync::Mutex;

    /// Same standing pose in every frame, counting calls
    struct StandingPlayer {
        calls: usize,
    }

    impl PoseEstimator for StandingPlayer {
        fn detect(&mut self, _image: &Mat) -> Result<Option<Pose>> {
            self.calls += 1;
            let mut pose = Pose::default();
            let mut set = |lm: Landmark, x: f32, y: f32| {
                pose.keypoints[lm as usize] = Keypoint::new(x, y, 0.95);
            };
            // 160x120 frame: 96px tall, 21.4px shoulders, 31.5px arms
            set(Landmark::Nose, 0.5, 0.1);
            set(Landmark::LeftShoulder, 0.433, 0.25);
            set(Landmark::RightShoulder, 0.567, 0.25);
            set(Landmark::LeftWrist, 0.433, 0.5125);
            set(Landmark::RightWrist, 0.567, 0.5125);
            set(Landmark::LeftHip, 0.46, 0.55);
            set(Landmark::RightHip, 0.54, 0.55);
            set(Landmark::LeftAnkle, 0.46, 0.9);
            set(Landmark::RightAnkle, 0.54, 0.9);
            Ok(Some(pose))
        }
    }

    /// 20 frames, an 80x8 bar jumping 20px down between frames 10 and 11
    fn swing_clip() -> FrameSequence {
        let gray = (0..20)
            .map(|i| {
                let y = if i <= 10 { 30 } else { 50 };
                frame_with_rect(160, 120, 40, y, 80, 8)
            })
            .collect();
        FrameSequence::new(gray, None, 30.0, 30.0)
    }

    fn uniform_clip(n: usize) -> FrameSequence {
        let gray = (0..n).map(|_| blank_frame(160, 120, 100.0)).collect();
        FrameSequence::new(gray, None, 30.0, 30.0)
    }

    #[test]
    fn test_uniform_clip_falls_back_with_low_confidence() {
        let analyzer = SwingAnalyzer::new(AnalyzerConfig::default());
        let result = analyzer
            .analyze_frames(&uniform_clip(12), None, &AnalysisRequest::default())
            .unwrap();

        assert_eq!(result.per_frame_speed_kmh.len(), 11);
        assert!(result.per_frame_speed_kmh.iter().all(|&v| v == 0.0));
        assert_eq!(result.speed_kmh, 0.0);
        assert_eq!(result.diagnostics.calibration_method, "fallback");
        assert!((result.diagnostics.cm_per_pixel - 155.0 / (160.0 * 0.35)).abs() < 1e-9);
        // 0.4 × 0.2 + 0.2 × (0.15 + 0.34)
        assert_eq!(result.confidence, 0.18);
        assert!(result.overlay_landmarks.frames.is_empty());
    }

    #[test]
    fn test_short_clip_is_rejected() {
        let analyzer = SwingAnalyzer::new(AnalyzerConfig::default());
        let mut estimator = StandingPlayer { calls: 0 };
        let err = analyzer
            .analyze_frames(&uniform_clip(4), Some(&mut estimator), &AnalysisRequest::default())
            .unwrap_err();

        assert!(matches!(err, AnalysisError::TooShort { frames: 4, required: 5 }));
        assert_eq!(estimator.calls, 0);
        assert_eq!(analyzer.metrics().summary().analyses_failed, 1);
    }

    #[test]
    fn test_consistent_pose_drives_calibration() {
        let analyzer = SwingAnalyzer::new(AnalyzerConfig::default());
        let mut estimator = StandingPlayer { calls: 0 };
        let result = analyzer
            .analyze_frames(&swing_clip(), Some(&mut estimator), &AnalysisRequest::default())
            .unwrap();

        assert_eq!(estimator.calls, 20);
        assert_eq!(result.diagnostics.peak_index, 10);
        assert_eq!(result.diagnostics.calibration_method, "pose_height");
        assert!(result.confidence >= 0.8, "confidence {}", result.confidence);
        assert!(result.speed_kmh > 0.0);

        // 20 frames at overlay step 3 → frames 0, 3, .., 18
        assert_eq!(result.overlay_landmarks.step, 3);
        assert_eq!(result.overlay_landmarks.frames.len(), 7);
        assert!(result.overlay_landmarks.frames.iter().all(|f| f.is_some()));
        // Standing still: wrists observed, zero displacement
        assert_eq!(result.diagnostics.wrist_speed_px_per_sec, Some(0.0));
    }

    #[test]
    fn test_identical_input_gives_identical_output() {
        let analyzer = SwingAnalyzer::new(AnalyzerConfig::default());
        let clip = swing_clip();
        let run = || {
            let mut estimator = StandingPlayer { calls: 0 };
            analyzer
                .analyze_frames(&clip, Some(&mut estimator), &AnalysisRequest::default())
                .unwrap()
        };
        let (a, b) = (run(), run());

        assert_eq!(a.speed_kmh, b.speed_kmh);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.per_frame_speed_kmh, b.per_frame_speed_kmh);
        assert_eq!(a.diagnostics.cm_per_pixel, b.diagnostics.cm_per_pixel);
    }

    #[test]
    fn test_reference_length_rescales_stick_calibration() {
        let analyzer = SwingAnalyzer::new(AnalyzerConfig::default());
        let clip = swing_clip();
        let at = |cm: f64| {
            let request = AnalysisRequest {
                reference_length_cm: Some(cm),
                ..AnalysisRequest::default()
            };
            analyzer.analyze_frames(&clip, None, &request).unwrap()
        };
        let (base, doubled) = (at(150.0), at(300.0));

        let method = base.diagnostics.calibration_method.clone();
        assert!(method.starts_with("stick_") || method == "fallback", "{}", method);
        let ratio = doubled.diagnostics.cm_per_pixel / base.diagnostics.cm_per_pixel;
        assert!((ratio - 2.0).abs() < 1e-9, "ratio {}", ratio);
        assert!((doubled.speed_kmh - 2.0 * base.speed_kmh).abs() <= 0.15);
    }

    #[test]
    fn test_non_positive_reference_is_ignored() {
        let analyzer = SwingAnalyzer::new(AnalyzerConfig::default());
        let clip = uniform_clip(8);
        let zero = AnalysisRequest {
            reference_length_cm: Some(0.0),
            player_height_cm: Some(-5.0),
            ..AnalysisRequest::default()
        };
        let a = analyzer.analyze_frames(&clip, None, &zero).unwrap();
        let b = analyzer
            .analyze_frames(&clip, None, &AnalysisRequest::default())
            .unwrap();

        assert_eq!(a.diagnostics.cm_per_pixel, b.diagnostics.cm_per_pixel);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_player_height_override_scales_pose_calibration() {
        let analyzer = SwingAnalyzer::new(AnalyzerConfig::default());
        let clip = swing_clip();
        let run = |height: Option<f64>| {
            let mut estimator = StandingPlayer { calls: 0 };
            let request = AnalysisRequest {
                player_height_cm: height,
                ..AnalysisRequest::default()
            };
            analyzer
                .analyze_frames(&clip, Some(&mut estimator), &request)
                .unwrap()
        };
        let average = run(None);
        let tall = run(Some(200.0));
        assert!(tall.diagnostics.cm_per_pixel > average.diagnostics.cm_per_pixel);
    }

    #[test]
    fn test_progress_milestones_in_order() {
        let analyzer = SwingAnalyzer::new(AnalyzerConfig::default());
        let seen = Mutex::new(Vec::new());
        let sink = |stage: ProgressStage| -> Result<()> {
            seen.lock().unwrap().push(stage.percent());
            Ok(())
        };
        let request = AnalysisRequest {
            progress: Some(&sink),
            ..AnalysisRequest::default()
        };
        analyzer.analyze_frames(&uniform_clip(6), None, &request).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![5, 35, 60, 85, 100]);
        assert_eq!(analyzer.metrics().summary().analyses_completed, 1);
    }

    #[test]
    fn test_fused_method_is_known_family() {
        let analyzer = SwingAnalyzer::new(AnalyzerConfig::default());
        let result = analyzer
            .analyze_frames(&swing_clip(), None, &AnalysisRequest::default())
            .unwrap();
        let known = [
            CalibrationMethod::StickFlow,
            CalibrationMethod::StickRidge,
            CalibrationMethod::StickEdge,
            CalibrationMethod::PlayerHeight,
            CalibrationMethod::Fallback,
        ];
        assert!(known
            .iter()
            .any(|m| m.as_str() == result.diagnostics.calibration_method));
        assert!(result.diagnostics.cm_per_pixel > 0.0);
    }
}
