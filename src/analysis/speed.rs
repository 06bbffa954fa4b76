// src/analysis/speed.rs
//
// Pixel motion → physical speed.
//
//   flow_cm_s = peak magnitude [px/frame] × fps × cm_per_pixel
//   pose_cm_s = wrist speed [px/s] × lever ratio × cm_per_pixel
//   speed     = blend × flow + (1 - blend) × pose   (flow alone without a wrist speed)
//
// The lever ratio approximates blade speed from hand speed.

use super::peak::PeakEvent;
use crate::pose::landmark::distance;
use crate::pose::{Landmark, PoseFrame};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub lever_ratio: f64,
    /// Share of the flow speed when a wrist speed is available
    pub flow_blend: f64,
    pub cm_s_to_kmh: f64,
    pub kmh_to_mph: f64,
    /// Wrist displacement is measured over peak ± this many frames
    pub wrist_window: usize,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            lever_ratio: 1.7,
            flow_blend: 0.6,
            cm_s_to_kmh: 0.036,
            kmh_to_mph: 0.621371,
            wrist_window: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedReport {
    pub flow_cm_s: f64,
    pub pose_cm_s: Option<f64>,
    pub speed_cm_s: f64,
    /// One decimal
    pub speed_kmh: f64,
    /// From the rounded km/h, one decimal
    pub speed_mph: f64,
    /// Flow-only km/h per frame pair, two decimals
    pub per_pair_kmh: Vec<f64>,
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Fastest wrist around the peak in px/s, or None
pub fn wrist_speed(
    records: &[Option<PoseFrame>],
    peak_idx: usize,
    fps: f64,
    window: usize,
) -> Option<f64> {
    if records.is_empty() || fps <= 0.0 {
        return None;
    }
    let start = peak_idx.saturating_sub(window).min(records.len() - 1);
    let end = (peak_idx + window).min(records.len() - 1);
    if end <= start {
        return None;
    }

    let (first, last) = (records[start]?, records[end]?);
    // Both ends carried from one detection: no observed motion
    if first.source_index == last.source_index {
        return None;
    }

    let elapsed = (end - start) as f64 / fps;
    let best = [Landmark::LeftWrist, Landmark::RightWrist]
        .into_iter()
        .filter_map(|wrist| {
            let a = first.landmarks.get(wrist)?;
            let b = last.landmarks.get(wrist)?;
            Some(distance(a, b) / elapsed)
        })
        .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))));

    debug!("Wrist speed over frames {}..={}: {:?} px/s", start, end, best);
    best
}

pub fn synthesize(
    peak: &PeakEvent,
    series: &[f64],
    fps: f64,
    cm_per_pixel: f64,
    wrist_px_s: Option<f64>,
    config: &SpeedConfig,
) -> SpeedReport {
    let flow_cm_s = peak.magnitude * fps * cm_per_pixel;
    let pose_cm_s = wrist_px_s.map(|w| w * config.lever_ratio * cm_per_pixel);

    let speed_cm_s = match pose_cm_s {
        Some(pose) => config.flow_blend * flow_cm_s + (1.0 - config.flow_blend) * pose,
        None => flow_cm_s,
    };

    let speed_kmh = round_to(speed_cm_s * config.cm_s_to_kmh, 1);
    let speed_mph = round_to(speed_kmh * config.kmh_to_mph, 1);

    let per_pair_kmh = series
        .iter()
        .map(|m| round_to(m * fps * cm_per_pixel * config.cm_s_to_kmh, 2))
        .collect();

    SpeedReport {
        flow_cm_s,
        pose_cm_s,
        speed_cm_s,
        speed_kmh,
        speed_mph,
        per_pair_kmh,
    }
}
