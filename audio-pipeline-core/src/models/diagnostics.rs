use serde::{Deserialize, Serialize};

/// Recoverable conditions reported while a pipeline runs.
///
/// None of these stop the capture; they are logged, counted in
/// [`PipelineDiagnostics`], and forwarded to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The hardware returned fewer bytes than one frame.
    ShortRead {
        tag: String,
        requested: usize,
        received: usize,
    },
    /// A push blocked past the stage's output deadline.
    PushTimeout { tag: String, pending: usize },
    /// A pop found no data within the stage's input timeout.
    PopTimeout { tag: String },
    /// Consecutive timeouts reached the stall threshold.
    Stalled {
        tag: String,
        consecutive_timeouts: u32,
    },
    /// The capture driver received less than the chunk it asked for.
    ShortPop { requested: usize, received: usize },
    /// A stage worker left its run loop.
    StageExited { tag: String },
}

/// Counters shared by every stage of a graph and by the capture driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    pub hardware_reads: u64,
    pub hardware_bytes: u64,
    pub short_reads: u64,
    pub push_timeouts: u64,
    pub pop_timeouts: u64,
    pub stall_warnings: u64,
    pub encoded_bytes: u64,
    pub short_pops: u64,
    pub bytes_written: u64,
}

impl PipelineDiagnostics {
    /// Fold one event into the counters.
    pub fn record(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ShortRead { .. } => self.short_reads += 1,
            PipelineEvent::PushTimeout { .. } => self.push_timeouts += 1,
            PipelineEvent::PopTimeout { .. } => self.pop_timeouts += 1,
            PipelineEvent::Stalled { .. } => self.stall_warnings += 1,
            PipelineEvent::ShortPop { .. } => self.short_pops += 1,
            PipelineEvent::StageExited { .. } => {}
        }
    }
}
