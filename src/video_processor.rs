// src/video_processor.rs

use crate::types::{AnalysisError, VideoConfig};
use anyhow::Result;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "m4v"];

/// Decoded clip, immutable after load
#[derive(Debug)]
pub struct FrameSequence {
    /// Single-channel 8-bit intensity frames
    pub gray: Vec<Mat>,
    /// Parallel BGR frames, kept only when pose estimation needs them
    pub color: Option<Vec<Mat>>,
    pub fps: f64,
}

impl FrameSequence {
    /// Non-positive or non-finite fps falls back to `default_fps`
    pub fn new(gray: Vec<Mat>, color: Option<Vec<Mat>>, fps: f64, default_fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { default_fps };
        Self { gray, color, fps }
    }

    pub fn len(&self) -> usize {
        self.gray.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gray.is_empty()
    }

    pub fn width(&self) -> i32 {
        self.gray.first().map_or(0, |m| m.cols())
    }

    pub fn height(&self) -> i32 {
        self.gray.first().map_or(0, |m| m.rows())
    }

    /// Frames for the pose estimator: color when kept, intensity otherwise
    pub fn pose_images(&self) -> &[Mat] {
        self.color.as_deref().unwrap_or(&self.gray)
    }
}

pub struct VideoProcessor {
    config: VideoConfig,
}

impl VideoProcessor {
    pub fn new(config: VideoConfig) -> Self {
        Self { config }
    }

    pub fn find_video_files(&self) -> Result<Vec<PathBuf>> {
        let mut videos = Vec::new();

        for entry in WalkDir::new(&self.config.input_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_video = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_video && entry.file_type().is_file() {
                videos.push(path.to_path_buf());
            }
        }

        info!("Found {} video files in {}", videos.len(), self.config.input_dir);
        Ok(videos)
    }

    /// Decode every frame of `path` into a `FrameSequence`
    pub fn load_clip(&self, path: &Path, keep_color: bool) -> Result<FrameSequence, AnalysisError> {
        let source = path.display().to_string();
        let invalid = |e: opencv::Error| AnalysisError::InvalidSource(format!("{}: {}", source, e));

        info!("Opening video: {}", source);
        let mut cap = VideoCapture::from_file(&source, videoio::CAP_ANY).map_err(invalid)?;
        if !cap.is_opened().map_err(invalid)? {
            return Err(AnalysisError::InvalidSource(source));
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS).map_err(invalid)?;

        let mut gray = Vec::new();
        let mut color = keep_color.then(Vec::new);
        let mut target: Option<Size> = None;

        loop {
            let mut frame = Mat::default();
            if !VideoCaptureTrait::read(&mut cap, &mut frame).map_err(invalid)? || frame.empty() {
                break;
            }

            let size = *target.get_or_insert_with(|| {
                scaled_size(frame.cols(), frame.rows(), self.config.max_frame_height)
            });
            let frame = fit_to(frame, size).map_err(invalid)?;

            gray.push(to_gray(&frame).map_err(invalid)?);
            if let Some(color) = color.as_mut() {
                color.push(frame);
            }
        }

        if gray.is_empty() {
            return Err(AnalysisError::EmptySource(source));
        }

        let sequence = FrameSequence::new(gray, color, fps, self.config.default_fps);
        info!(
            "Loaded {} frames, {}x{} @ {:.1} FPS",
            sequence.len(),
            sequence.width(),
            sequence.height(),
            sequence.fps
        );
        Ok(sequence)
    }
}

/// Target size so that height ≤ `max_height`, aspect ratio preserved
pub fn scaled_size(width: i32, height: i32, max_height: i32) -> Size {
    if max_height <= 0 || height <= max_height {
        return Size::new(width, height);
    }
    let scale = max_height as f64 / height as f64;
    let new_width = ((width as f64 * scale).round() as i32).max(1);
    Size::new(new_width, max_height)
}

fn fit_to(frame: Mat, size: Size) -> opencv::Result<Mat> {
    if frame.cols() == size.width && frame.rows() == size.height {
        return Ok(frame);
    }
    debug!("Resizing {}x{} → {}x{}", frame.cols(), frame.rows(), size.width, size.height);
    let mut resized = Mat::default();
    imgproc::resize(&frame, &mut resized, size, 0.0, 0.0, imgproc::INTER_AREA)?;
    Ok(resized)
}

fn to_gray(frame: &Mat) -> opencv::Result<Mat> {
    match frame.channels() {
        1 => frame.try_clone(),
        4 => {
            let mut gray = Mat::default();
            imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGRA2GRAY)?;
            Ok(gray)
        }
        _ => {
            let mut gray = Mat::default();
            imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
            Ok(gray)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scaled_size_caps_height_only() {
        assert_eq!(scaled_size(1920, 1080, 720), Size::new(1280, 720));
        assert_eq!(scaled_size(640, 480, 720), Size::new(640, 480));
        assert_eq!(scaled_size(1080, 1920, 720), Size::new(405, 720));
    }

    #[test]
    fn test_fps_default() {
        let seq = FrameSequence::new(Vec::new(), None, 0.0, 30.0);
        assert_eq!(seq.fps, 30.0);
        let seq = FrameSequence::new(Vec::new(), None, f64::NAN, 25.0);
        assert_eq!(seq.fps, 25.0);
        let seq = FrameSequence::new(Vec::new(), None, 59.94, 30.0);
        assert_eq!(seq.fps, 59.94);
        assert!(seq.is_empty());
        assert_eq!(seq.width(), 0);
    }

    #[test]
    fn test_missing_file_is_invalid_source() {
        let processor = VideoProcessor::new(VideoConfig::default());
        let err = processor
            .load_clip(Path::new("/nonexistent/swing.mp4"), false)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidSource(_)), "{:?}", err);
    }

    #[test]
    fn test_find_video_files_filters_by_extension() {
        let dir = std::env::temp_dir().join(format!("swing_speed_find_{}", std::process::id()));
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("a.mp4"), b"").unwrap();
        fs::write(dir.join("nested").join("b.MOV"), b"").unwrap();
        fs::write(dir.join("notes.txt"), b"").unwrap();

        let processor = VideoProcessor::new(VideoConfig {
            input_dir: dir.to_string_lossy().into_owned(),
            ..VideoConfig::default()
        });
        let found = processor.find_video_files().unwrap();
        fs::remove_dir_all(&dir).unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.extension().is_some_and(|e| e != "txt")));
    }
}
