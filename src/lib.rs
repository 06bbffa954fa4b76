// src/lib.rs
//
// Hockey-stick swing speed estimation from ordinary video.

pub mod analysis;
pub mod config;
pub mod inference;
pub mod pipeline;
pub mod pose;
pub mod preprocessing;
pub mod types;
pub mod video_processor;

pub use analysis::{AnalysisRequest, AnalyzerConfig, SwingAnalyzer};
pub use types::{AnalysisError, Config, SwingAnalysis};
