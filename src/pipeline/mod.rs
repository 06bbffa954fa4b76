// src/pipeline/mod.rs

pub mod metrics;
pub mod progress;

pub use metrics::{AnalysisMetrics, MetricsSummary, StageClock, StageTimings};
pub use progress::{notify, ProgressSink, ProgressStage};
