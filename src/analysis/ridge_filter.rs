// src/analysis/ridge_filter.rs
//
// Multi-scale Hessian tubular-structure enhancement (Frangi vesselness) for
// bright ridges on a dark background. A moving stick leaves a thin bright
// band in the frame difference, which this turns into a strong, connected
// response even when the raw difference is patchy.
//
// Per scale σ:
//   H = σ² · [[Ixx, Ixy], [Ixy, Iyy]] of the Gaussian-smoothed image
//   |λ1| ≤ |λ2|,  Rb = |λ1| / |λ2|,  S = sqrt(λ1² + λ2²)
//   V = exp(-Rb² / 2β²) · (1 - exp(-S² / 2c²)),  V = 0 where λ2 > 0
// with c = max(S) / 2. The output is the maximum over scales.

use super::motion_field::mat_to_f32;
use opencv::{
    core::{self, Mat, Size},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeConfig {
    pub scales: Vec<f64>,
    pub beta: f64,
    /// Mask threshold as a fraction of the strongest response
    pub threshold_fraction: f64,
}

impl Default for RidgeConfig {
    fn default() -> Self {
        Self {
            scales: vec![1.0, 2.0, 3.0, 4.0],
            beta: 0.5,
            threshold_fraction: 0.15,
        }
    }
}

/// Scale-normalized Hessian components (xx, yy, xy) of a CV_32F image
pub fn hessian(image: &Mat, sigma: f64) -> opencv::Result<(Vec<f32>, Vec<f32>, Vec<f32>)> {
    let mut smoothed = Mat::default();
    imgproc::gaussian_blur_def(image, &mut smoothed, Size::new(0, 0), sigma)?;

    let norm = (sigma * sigma) as f32;
    let component = |dx: i32, dy: i32| -> opencv::Result<Vec<f32>> {
        let mut out = Mat::default();
        imgproc::sobel_def(&smoothed, &mut out, core::CV_32F, dx, dy)?;
        Ok(mat_to_f32(&out)?.into_iter().map(|v| v * norm).collect())
    };

    let hxx = component(2, 0)?;
    let hyy = component(0, 2)?;
    let hxy = component(1, 1)?;
    Ok((hxx, hyy, hxy))
}

/// Bright-ridge vesselness for one scale, max-combined into `out`
pub fn accumulate_vesselness(hxx: &[f32], hyy: &[f32], hxy: &[f32], beta: f64, out: &mut [f32]) {
    let n = out.len().min(hxx.len()).min(hyy.len()).min(hxy.len());

    let mut eigen = Vec::with_capacity(n);
    let mut max_norm = 0.0f64;
    for i in 0..n {
        let (xx, yy, xy) = (hxx[i] as f64, hyy[i] as f64, hxy[i] as f64);
        let root = ((xx - yy) * (xx - yy) + 4.0 * xy * xy).sqrt();
        let a = (xx + yy + root) / 2.0;
        let b = (xx + yy - root) / 2.0;
        let (l1, l2) = if a.abs() <= b.abs() { (a, b) } else { (b, a) };
        let s = (l1 * l1 + l2 * l2).sqrt();
        max_norm = max_norm.max(s);
        eigen.push((l1, l2, s));
    }

    let c = if max_norm > 0.0 { max_norm / 2.0 } else { 1.0 };
    let two_beta_sq = 2.0 * beta * beta;
    let two_c_sq = 2.0 * c * c;

    for (i, &(l1, l2, s)) in eigen.iter().enumerate() {
        if l2 >= 0.0 {
            continue;
        }
        let rb = l1.abs() / l2.abs().max(1e-10);
        let v = (-(rb * rb) / two_beta_sq).exp() * (1.0 - (-(s * s) / two_c_sq).exp());
        if v as f32 > out[i] {
            out[i] = v as f32;
        }
    }
}

/// Maximum vesselness over all scales, row-major, same size as `image`
pub fn frangi_bright(image: &Mat, config: &RidgeConfig) -> opencv::Result<Vec<f32>> {
    let mut response = vec![0.0f32; (image.rows() * image.cols()) as usize];
    for &sigma in &config.scales {
        let (hxx, hyy, hxy) = hessian(image, sigma)?;
        accumulate_vesselness(&hxx, &hyy, &hxy, config.beta, &mut response);
    }
    Ok(response)
}
