// src/pipeline/metrics.rs
//
// Observability for the analyzer. `StageTimings` describes one analysis;
// `AnalysisMetrics` aggregates across every analysis sharing the handle
// (the CLI shares one across its concurrent workers).

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wall time per stage of a single analysis, in microseconds
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageTimings {
    pub load_us: u64,
    pub motion_us: u64,
    pub pose_us: u64,
    pub calibration_us: u64,
    pub total_us: u64,
}

/// Measures consecutive stages of one call
pub struct StageClock {
    started_at: Instant,
    lap_at: Instant,
}

impl StageClock {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            lap_at: now,
        }
    }

    /// Microseconds since the previous lap
    pub fn lap(&mut self) -> u64 {
        let now = Instant::now();
        let us = duration_us(now - self.lap_at);
        self.lap_at = now;
        us
    }

    pub fn total(&self) -> u64 {
        duration_us(self.started_at.elapsed())
    }
}

fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone)]
pub struct AnalysisMetrics {
    pub analyses_completed: Arc<AtomicU64>,
    pub analyses_failed: Arc<AtomicU64>,
    pub frames_analyzed: Arc<AtomicU64>,
    pub pose_inferences: Arc<AtomicU64>,
    pub load_time_us: Arc<AtomicU64>,
    pub motion_time_us: Arc<AtomicU64>,
    pub pose_time_us: Arc<AtomicU64>,
    pub calibration_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for AnalysisMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisMetrics {
    pub fn new() -> Self {
        Self {
            analyses_completed: Arc::new(AtomicU64::new(0)),
            analyses_failed: Arc::new(AtomicU64::new(0)),
            frames_analyzed: Arc::new(AtomicU64::new(0)),
            pose_inferences: Arc::new(AtomicU64::new(0)),
            load_time_us: Arc::new(AtomicU64::new(0)),
            motion_time_us: Arc::new(AtomicU64::new(0)),
            pose_time_us: Arc::new(AtomicU64::new(0)),
            calibration_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn record_success(&self, frames: usize, timings: &StageTimings) {
        self.inc(&self.analyses_completed);
        self.add(&self.frames_analyzed, frames as u64);
        self.add(&self.load_time_us, timings.load_us);
        self.add(&self.motion_time_us, timings.motion_us);
        self.add(&self.pose_time_us, timings.pose_us);
        self.add(&self.calibration_time_us, timings.calibration_us);
    }

    pub fn summary(&self) -> MetricsSummary {
        let completed = self.analyses_completed.load(Ordering::Relaxed);
        let avg = |counter: &AtomicU64| {
            if completed > 0 {
                counter.load(Ordering::Relaxed) / completed
            } else {
                0
            }
        };
        let frames = self.frames_analyzed.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();

        MetricsSummary {
            analyses_completed: completed,
            analyses_failed: self.analyses_failed.load(Ordering::Relaxed),
            frames_analyzed: frames,
            pose_inferences: self.pose_inferences.load(Ordering::Relaxed),
            frames_per_sec: if elapsed > 0.01 { frames as f64 / elapsed } else { 0.0 },
            avg_load_us: avg(&self.load_time_us),
            avg_motion_us: avg(&self.motion_time_us),
            avg_pose_us: avg(&self.pose_time_us),
            avg_calibration_us: avg(&self.calibration_time_us),
            elapsed_secs: elapsed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub analyses_completed: u64,
    pub analyses_failed: u64,
    pub frames_analyzed: u64,
    pub pose_inferences: u64,
    pub frames_per_sec: f64,
    pub avg_load_us: u64,
    pub avg_motion_us: u64,
    pub avg_pose_us: u64,
    pub avg_calibration_us: u64,
    pub elapsed_secs: f64,
}
