// src/preprocessing.rs

use anyhow::{Context, Result};
use opencv::{core::Mat, imgproc, prelude::*};

/// Convert an OpenCV frame (BGR or grayscale) into packed RGB bytes
pub fn frame_to_rgb(frame: &Mat) -> Result<(Vec<u8>, usize, usize)> {
    let code = match frame.channels() {
        1 => imgproc::COLOR_GRAY2RGB,
        3 => imgproc::COLOR_BGR2RGB,
        4 => imgproc::COLOR_BGRA2RGB,
        n => anyhow::bail!("unsupported channel count {}", n),
    };

    let mut rgb = Mat::default();
    imgproc::cvt_color_def(frame, &mut rgb, code).context("Failed to convert frame to RGB")?;

    let data = if rgb.is_continuous() {
        rgb.data_bytes()?.to_vec()
    } else {
        rgb.try_clone()?.data_bytes()?.to_vec()
    };

    Ok((data, rgb.cols() as usize, rgb.rows() as usize))
}

/// Preprocess packed RGB for a square pose model: resize, keep HWC order,
/// raw 0-255 float range.
pub fn preprocess_pose_input(
    src: &[u8],
    src_width: usize,
    src_height: usize,
    input_size: usize,
) -> Result<Vec<f32>> {
    if src.len() != src_width * src_height * 3 {
        anyhow::bail!(
            "RGB buffer of {} bytes does not match {}x{}",
            src.len(),
            src_width,
            src_height
        );
    }

    let resized = resize_bilinear(src, src_width, src_height, input_size, input_size);
    Ok(resized.into_iter().map(|v| v as f32).collect())
}

/// Bilinear image resize
fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = (dx as f32 * x_ratio).min((src_w - 1) as f32);
            let sy = (dy as f32 * y_ratio).min((src_h - 1) as f32);

            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);

            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }

    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{self, Scalar};

    #[test]
    fn test_preprocess_pose_input() {
        let src = vec![128u8; 640 * 480 * 3];
        let result = preprocess_pose_input(&src, 640, 480, 192).unwrap();
        assert_eq!(result.len(), 192 * 192 * 3);
        assert!(result.iter().all(|&v| v == 128.0));
    }

    #[test]
    fn test_preprocess_rejects_mismatched_buffer() {
        let src = vec![0u8; 10];
        assert!(preprocess_pose_input(&src, 640, 480, 192).is_err());
    }

    #[test]
    fn test_resize() {
        let src = vec![255u8; 100 * 100 * 3];
        let dst = resize_bilinear(&src, 100, 100, 50, 50);
        assert_eq!(dst.len(), 50 * 50 * 3);
    }

    #[test]
    fn test_frame_to_rgb_swaps_channels() {
        let bgr =
            Mat::new_rows_cols_with_default(4, 6, core::CV_8UC3, Scalar::new(10.0, 20.0, 30.0, 0.0))
                .unwrap();
        let (data, w, h) = frame_to_rgb(&bgr).unwrap();
        assert_eq!((w, h), (6, 4));
        assert_eq!(&data[0..3], &[30, 20, 10]);
    }
}
