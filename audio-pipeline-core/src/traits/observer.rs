use crate::models::diagnostics::PipelineEvent;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::PipelineState;

/// Receives pipeline notifications.
///
/// Methods are called from stage worker threads as well as from the
/// thread running the capture driver; implementations must not block.
pub trait PipelineObserver: Send + Sync {
    fn on_state_changed(&self, _state: PipelineState) {}

    /// A recoverable condition: short read, timeout, stall.
    fn on_event(&self, _event: &PipelineEvent) {}

    /// A fatal error, reported before the session unwinds.
    fn on_error(&self, _error: &CaptureError) {}

    /// Called when capture completes and the file is finalized.
    fn on_capture_finished(&self, _result: &RecordingResult) {}
}
