use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::AudioDevice;
use crate::models::diagnostics::{PipelineDiagnostics, PipelineEvent};
use crate::models::error::{CaptureError, RingBufferError};
use crate::processing::encoder::Container;
use crate::processing::ring_buffer::{RingBuffer, Timeout};
use crate::traits::observer::PipelineObserver;

/// Position of a stage in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    /// Produces bytes; has only an output link.
    Source,
    /// Consumes and produces; has both links.
    Transform,
    /// Terminal buffer drained by the capture driver; has only an input link.
    Sink,
}

/// Whether a stage wants to keep running after one `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished,
}

/// Result of reading from a stage's input link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    /// Nothing arrived within the input timeout.
    Idle,
    /// Upstream closed and everything buffered has been read.
    Closed,
}

/// One element of a pipeline graph.
///
/// The graph calls `process` in a loop on a dedicated worker thread until
/// it returns [`Flow::Finished`], an error, or the stage is stopped. Each
/// call should block at most one bounded transfer so stop requests are
/// noticed. `release` runs exactly once, on the worker thread after the
/// loop ends, or during teardown if the stage never started.
pub trait Stage: Send {
    fn role(&self) -> StageRole;

    fn process(&mut self, io: &mut StageIo) -> Result<Flow, CaptureError>;

    fn release(&mut self) {}

    /// Preferred CPU core for the worker thread.
    fn affinity_hint(&self) -> Option<usize> {
        None
    }

    /// Deadline for pushes to the output link; the graph default if `None`.
    fn output_timeout(&self) -> Option<Timeout> {
        None
    }

    /// Container layout this stage produces, for encoding stages.
    fn container(&self) -> Option<Container> {
        None
    }

    /// Hardware this stage reads from, for source stages.
    fn device_info(&self) -> Option<AudioDevice> {
        None
    }
}

/// State shared by every worker of a graph and by the capture driver.
pub(crate) struct PipelineShared {
    diagnostics: Mutex<PipelineDiagnostics>,
    failure: Mutex<Option<CaptureError>>,
    observer: Option<Arc<dyn PipelineObserver>>,
}

impl PipelineShared {
    pub(crate) fn new(observer: Option<Arc<dyn PipelineObserver>>) -> Self {
        Self {
            diagnostics: Mutex::new(PipelineDiagnostics::default()),
            failure: Mutex::new(None),
            observer,
        }
    }

    pub(crate) fn observer(&self) -> Option<&Arc<dyn PipelineObserver>> {
        self.observer.as_ref()
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::ShortRead {
                tag,
                requested,
                received,
            } => log::warn!("[{}] short read: {} of {} bytes", tag, received, requested),
            PipelineEvent::Stalled {
                tag,
                consecutive_timeouts,
            } => log::warn!(
                "[{}] stalled: {} consecutive buffer timeouts",
                tag,
                consecutive_timeouts
            ),
            PipelineEvent::StageExited { tag } => log::info!("[{}] stage exited", tag),
            other => log::debug!("{:?}", other),
        }
        self.diagnostics.lock().record(&event);
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }

    pub(crate) fn count(&self, update: impl FnOnce(&mut PipelineDiagnostics)) {
        update(&mut self.diagnostics.lock());
    }

    pub(crate) fn diagnostics(&self) -> PipelineDiagnostics {
        self.diagnostics.lock().clone()
    }

    /// Record a fatal stage error. Only the first one is kept.
    pub(crate) fn fail(&self, error: CaptureError) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            if let Some(observer) = &self.observer {
                observer.on_error(&error);
            }
            *slot = Some(error);
        }
    }

    pub(crate) fn failure(&self) -> Option<CaptureError> {
        self.failure.lock().clone()
    }
}

/// A stage's view of its links, handed to [`Stage::process`].
///
/// Wraps the input and output ring buffers with the stage's timeouts and
/// counts consecutive timeouts toward the stall threshold.
pub struct StageIo {
    tag: String,
    input: Option<Arc<RingBuffer>>,
    output: Option<Arc<RingBuffer>>,
    running: Arc<AtomicBool>,
    input_timeout: Timeout,
    output_timeout: Timeout,
    stall_threshold: u32,
    input_timeouts: u32,
    output_timeouts: u32,
    shared: Arc<PipelineShared>,
}

impl StageIo {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        tag: &str,
        input: Option<Arc<RingBuffer>>,
        output: Option<Arc<RingBuffer>>,
        running: Arc<AtomicBool>,
        input_timeout: Timeout,
        output_timeout: Timeout,
        stall_threshold: u32,
        shared: Arc<PipelineShared>,
    ) -> Self {
        Self {
            tag: tag.to_string(),
            input,
            output,
            running,
            input_timeout,
            output_timeout,
            stall_threshold: stall_threshold.max(1),
            input_timeouts: 0,
            output_timeouts: 0,
            shared,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Pop up to `buf.len()` bytes from the input link.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, CaptureError> {
        let input = self.input.as_ref().ok_or_else(|| {
            CaptureError::LinkFailed(format!("stage '{}' has no input link", self.tag))
        })?;
        match input.pop_into(buf, self.input_timeout) {
            Ok(n) => {
                self.input_timeouts = 0;
                Ok(ReadOutcome::Data(n))
            }
            Err(RingBufferError::TimedOut) => {
                self.input_timeouts += 1;
                self.shared.emit(PipelineEvent::PopTimeout {
                    tag: self.tag.clone(),
                });
                self.check_stall(self.input_timeouts);
                Ok(ReadOutcome::Idle)
            }
            Err(RingBufferError::Closed) => Ok(ReadOutcome::Closed),
        }
    }

    /// Push all of `bytes` to the output link, retrying short and timed-out
    /// pushes. Returns [`Flow::Finished`] if the link closes or the stage
    /// is stopped first.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<Flow, CaptureError> {
        let output = Arc::clone(self.output.as_ref().ok_or_else(|| {
            CaptureError::LinkFailed(format!("stage '{}' has no output link", self.tag))
        })?);

        let mut offset = 0;
        while offset < bytes.len() {
            if !self.is_running() {
                return Ok(Flow::Finished);
            }
            match output.push(&bytes[offset..], self.output_timeout) {
                Ok(n) => {
                    offset += n;
                    self.output_timeouts = 0;
                }
                Err(RingBufferError::TimedOut) => {
                    self.output_timeouts += 1;
                    self.shared.emit(PipelineEvent::PushTimeout {
                        tag: self.tag.clone(),
                        pending: bytes.len() - offset,
                    });
                    self.check_stall(self.output_timeouts);
                }
                Err(RingBufferError::Closed) => return Ok(Flow::Finished),
            }
        }
        Ok(Flow::Continue)
    }

    /// Report a hardware read that returned less than a frame.
    pub fn report_short_read(&self, requested: usize, received: usize) {
        self.shared.emit(PipelineEvent::ShortRead {
            tag: self.tag.clone(),
            requested,
            received,
        });
    }

    /// Update the graph's shared counters.
    pub fn count(&self, update: impl FnOnce(&mut PipelineDiagnostics)) {
        self.shared.count(update);
    }

    /// Close both links so neighbours blocked on them wake up.
    pub(crate) fn close_links(&self) {
        if let Some(input) = &self.input {
            input.close();
        }
        if let Some(output) = &self.output {
            output.close();
        }
    }

    fn check_stall(&self, consecutive: u32) {
        if consecutive % self.stall_threshold == 0 {
            self.shared.emit(PipelineEvent::Stalled {
                tag: self.tag.clone(),
                consecutive_timeouts: consecutive,
            });
        }
    }
}
