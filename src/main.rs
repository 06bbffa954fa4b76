// src/main.rs

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swing_speed::inference::OnnxPoseEstimator;
use swing_speed::pipeline::{AnalysisMetrics, ProgressStage};
use swing_speed::pose::{PoseEstimator, SharedPoseEstimator};
use swing_speed::video_processor::VideoProcessor;
use swing_speed::{AnalysisRequest, Config, SwingAnalysis, SwingAnalyzer};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.yaml";

/// `swing_speed [config.yaml] [video...]`
struct CliArgs {
    config_path: PathBuf,
    videos: Vec<PathBuf>,
}

impl CliArgs {
    fn parse() -> Self {
        let mut config_path = PathBuf::from(DEFAULT_CONFIG);
        let mut videos = Vec::new();
        for (i, arg) in std::env::args().skip(1).enumerate() {
            let path = PathBuf::from(arg);
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
            if i == 0 && is_yaml {
                config_path = path;
            } else {
                videos.push(path);
            }
        }
        Self { config_path, videos }
    }
}

type SharedEstimator = SharedPoseEstimator<OnnxPoseEstimator>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = Config::load_or_default(&args.config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🏒 Swing Speed Analyzer Starting");
    info!("✓ Configuration loaded from {}", args.config_path.display());

    let estimator = build_estimator(&config);

    let video_processor = Arc::new(VideoProcessor::new(config.video.clone()));
    let video_files = if args.videos.is_empty() {
        video_processor.find_video_files()?
    } else {
        args.videos
    };

    if video_files.is_empty() {
        error!("No video files found in {}", config.video.input_dir);
        return Ok(());
    }

    std::fs::create_dir_all(&config.video.output_dir)
        .with_context(|| format!("Failed to create output dir {}", config.video.output_dir))?;

    info!(
        "Found {} video file(s), up to {} analyses at once",
        video_files.len(),
        config.service.max_concurrent_analyses
    );

    let metrics = AnalysisMetrics::new();
    let analyzer = Arc::new(SwingAnalyzer::with_metrics(config.analysis.clone(), metrics.clone()));
    let config = Arc::new(config);
    let semaphore = Arc::new(Semaphore::new(config.service.max_concurrent_analyses.max(1)));

    let mut handles = Vec::with_capacity(video_files.len());
    for video_path in video_files {
        let permit = semaphore.clone().acquire_owned().await?;
        let analyzer = Arc::clone(&analyzer);
        let video_processor = Arc::clone(&video_processor);
        let config = Arc::clone(&config);
        let mut estimator = estimator.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let outcome = analyze_video(
                &video_path,
                &analyzer,
                &video_processor,
                estimator.as_mut(),
                &config,
            );
            (video_path, outcome)
        }));
    }

    let mut succeeded = 0usize;
    for handle in handles {
        let (video_path, outcome) = handle.await?;
        match outcome {
            Ok(Some(result)) => {
                succeeded += 1;
                info!("\n✓ {}", video_path.display());
                info!("  Speed: {:.1} km/h ({:.1} mph)", result.speed_kmh, result.speed_mph);
                info!("  Confidence: {:.2}", result.confidence);
                info!(
                    "  Calibration: {} ({:.4} cm/px)",
                    result.diagnostics.calibration_method, result.diagnostics.cm_per_pixel
                );
            }
            Ok(None) => {}
            Err(e) => error!("✗ {}: {:#}", video_path.display(), e),
        }
    }

    let summary = metrics.summary();
    info!("\n📊 Final Report:");
    info!("  Analyses: {} ok, {} failed", succeeded, summary.analyses_failed);
    info!("  Frames analyzed: {} ({:.1} FPS)", summary.frames_analyzed, summary.frames_per_sec);
    info!("  Pose inferences: {}", summary.pose_inferences);
    info!(
        "  Avg stage time: load {}µs, motion {}µs, pose {}µs, calibration {}µs",
        summary.avg_load_us, summary.avg_motion_us, summary.avg_pose_us, summary.avg_calibration_us
    );

    Ok(())
}

fn build_estimator(config: &Config) -> Option<SharedEstimator> {
    if config.pose.model_path.is_none() {
        info!("⚪ No pose model configured, analyzing without pose");
        return None;
    }
    match OnnxPoseEstimator::new(&config.pose) {
        Ok(estimator) => {
            info!("✓ Pose estimator ready");
            Some(SharedPoseEstimator::new(estimator))
        }
        Err(e) => {
            warn!("⚠️  Pose estimator unavailable, continuing without pose: {:#}", e);
            None
        }
    }
}

/// Ok(None) when the analysis itself rejected the clip (already logged)
fn analyze_video(
    path: &Path,
    analyzer: &SwingAnalyzer,
    video_processor: &VideoProcessor,
    estimator: Option<&mut SharedEstimator>,
    config: &Config,
) -> Result<Option<SwingAnalysis>> {
    let name = path.display().to_string();
    let progress = |stage: ProgressStage| -> Result<()> {
        debug!("{}: {}% ({})", name, stage.percent(), stage.as_str());
        Ok(())
    };
    let request = AnalysisRequest {
        reference_length_cm: config.service.reference_length_cm,
        player_height_cm: config.service.player_height_cm,
        progress: Some(&progress),
    };

    let estimator = estimator.map(|e| e as &mut dyn PoseEstimator);
    let result = match analyzer.analyze_file(path, video_processor, estimator, &request) {
        Ok(result) => result,
        Err(e) => {
            error!("✗ {} [{}]: {}", name, e.label(), e);
            return Ok(None);
        }
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("clip");
    let output_path = Path::new(&config.video.output_dir).join(format!("{}_swing.json", stem));
    let json = serde_json::to_string_pretty(&result)?;
    std::fs::write(&output_path, json)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    info!("💾 Result written to {}", output_path.display());

    Ok(Some(result))
}
