use crate::models::error::CaptureError;
use crate::pipeline::stage::{Flow, Stage, StageIo, StageRole};

/// Terminal element of a pipeline.
///
/// A sink runs no worker of its own: linking turns its input into the
/// graph's sink buffer, which the capture driver drains on the caller's
/// thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SinkStage;

impl SinkStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for SinkStage {
    fn role(&self) -> StageRole {
        StageRole::Sink
    }

    fn process(&mut self, _io: &mut StageIo) -> Result<Flow, CaptureError> {
        Ok(Flow::Finished)
    }
}
