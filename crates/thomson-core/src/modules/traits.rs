use super::fiber::Fiber;
use crate::domain::{PipelineStage, ThomsonResult};

/// Outcome counters of one stage over one fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSummary {
    pub stage: PipelineStage,
    pub processed: usize,
    pub skipped: usize,
}

impl StageSummary {
    pub fn new(stage: PipelineStage) -> Self {
        Self {
            stage,
            processed: 0,
            skipped: 0,
        }
    }
}

/// One pipeline stage, mutating the fiber's derived state in place.
///
/// `Err` means the fiber as a whole cannot run this stage (missing
/// calibration, stage run out of order); per-shot problems are recorded on
/// the fiber and counted as skipped.
pub trait FiberStage {
    fn stage(&self) -> PipelineStage;

    fn execute(&self, fiber: &mut Fiber) -> ThomsonResult<StageSummary>;
}
