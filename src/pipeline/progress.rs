// src/pipeline/progress.rs
//
// Coarse progress reporting for one analysis. The analyzer publishes a
// fixed set of milestones; whatever the sink does with them (log, forward
// to a job tracker, print a bar) cannot affect the analysis.

use anyhow::Result;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    FramesLoaded,
    MotionAnalyzed,
    PoseSampled,
    Calibrated,
    Finished,
}

impl ProgressStage {
    pub fn percent(&self) -> u8 {
        match self {
            ProgressStage::FramesLoaded => 5,
            ProgressStage::MotionAnalyzed => 35,
            ProgressStage::PoseSampled => 60,
            ProgressStage::Calibrated => 85,
            ProgressStage::Finished => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::FramesLoaded => "frames_loaded",
            ProgressStage::MotionAnalyzed => "motion_analyzed",
            ProgressStage::PoseSampled => "pose_sampled",
            ProgressStage::Calibrated => "calibrated",
            ProgressStage::Finished => "finished",
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, stage: ProgressStage) -> Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressStage) -> Result<()> + Send + Sync,
{
    fn report(&self, stage: ProgressStage) -> Result<()> {
        self(stage)
    }
}

/// Report to an optional sink; failures are logged and dropped
pub fn notify(sink: Option<&dyn ProgressSink>, stage: ProgressStage) {
    let Some(sink) = sink else {
        return;
    };
    if let Err(e) = sink.report(stage) {
        debug!("Progress sink rejected {} ({}%): {:#}", stage.as_str(), stage.percent(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_milestones_increase() {
        let stages = [
            ProgressStage::FramesLoaded,
            ProgressStage::MotionAnalyzed,
            ProgressStage::PoseSampled,
            ProgressStage::Calibrated,
            ProgressStage::Finished,
        ];
        assert!(stages.windows(2).all(|w| w[0].percent() < w[1].percent()));
        assert_eq!(ProgressStage::Finished.percent(), 100);
    }

    #[test]
    fn test_closure_sink_and_failing_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |stage: ProgressStage| -> Result<()> {
            seen.lock().unwrap().push(stage.percent());
            Ok(())
        };
        notify(Some(&sink), ProgressStage::FramesLoaded);
        notify(None, ProgressStage::Calibrated);
        assert_eq!(*seen.lock().unwrap(), vec![5]);

        let failing = |_: ProgressStage| -> Result<()> { anyhow::bail!("callback endpoint down") };
        notify(Some(&failing), ProgressStage::Finished);
    }
}
