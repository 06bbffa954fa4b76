// src/pose/estimator.rs
//
// The pose-estimation capability consumed by the analysis core.
//
// Concurrency contract: `detect` takes `&mut self`, so one estimator is
// never driven by two analyses at once. Callers that share a single model
// across concurrent analyses wrap it in `SharedPoseEstimator`, which
// serializes every detection behind a mutex.

use super::landmark::Pose;
use anyhow::{anyhow, Result};
use opencv::core::Mat;
use std::sync::{Arc, Mutex};

pub trait PoseEstimator {
    /// Detect zero or one person in a BGR (or grayscale) frame.
    /// Landmark coordinates are normalized to the frame size.
    fn detect(&mut self, image: &Mat) -> Result<Option<Pose>>;
}

impl<P: PoseEstimator + ?Sized> PoseEstimator for Box<P> {
    fn detect(&mut self, image: &Mat) -> Result<Option<Pose>> {
        (**self).detect(image)
    }
}

/// Cloneable handle that serializes access to one estimator
pub struct SharedPoseEstimator<P> {
    inner: Arc<Mutex<P>>,
}

impl<P> SharedPoseEstimator<P> {
    pub fn new(estimator: P) -> Self {
        Self {
            inner: Arc::new(Mutex::new(estimator)),
        }
    }
}

impl<P> Clone for SharedPoseEstimator<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: PoseEstimator> PoseEstimator for SharedPoseEstimator<P> {
    fn detect(&mut self, image: &Mat) -> Result<Option<Pose>> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("pose estimator lock poisoned"))?;
        guard.detect(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEstimator {
        calls: usize,
    }

    impl PoseEstimator for CountingEstimator {
        fn detect(&mut self, _image: &Mat) -> Result<Option<Pose>> {
            self.calls += 1;
            Ok(None)
        }
    }

    #[test]
    fn test_shared_estimator_serializes_through_one_instance() {
        let shared = SharedPoseEstimator::new(CountingEstimator { calls: 0 });
        let mut a = shared.clone();
        let mut b = shared.clone();
        let frame = Mat::default();

        a.detect(&frame).unwrap();
        b.detect(&frame).unwrap();
        b.detect(&frame).unwrap();

        assert_eq!(shared.inner.lock().unwrap().calls, 3);
    }
}
