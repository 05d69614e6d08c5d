use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::models::audio_models::AudioDevice;
use crate::models::config::GraphConfig;
use crate::models::diagnostics::{PipelineDiagnostics, PipelineEvent};
use crate::models::error::CaptureError;
use crate::models::state::PipelineState;
use crate::pipeline::stage::{Flow, PipelineShared, Stage, StageIo, StageRole};
use crate::processing::encoder::Container;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::observer::PipelineObserver;

struct StageSlot {
    tag: String,
    role: StageRole,
    container: Option<Container>,
    device: Option<AudioDevice>,
    /// `None` once the stage has moved onto its worker thread.
    stage: Option<Box<dyn Stage>>,
}

struct Worker {
    tag: String,
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Owns the stages and ring buffers of one capture session.
///
/// ```text
/// [source] → ring → [transform] → ring → … → sink buffer → CaptureDriver
/// ```
///
/// Lifecycle: `Constructed → Linked → Running → Draining → Stopped`.
/// Stages are registered while constructed, wired by [`link`](Self::link),
/// and each non-sink stage gets its own worker thread on [`run`](Self::run).
/// [`stop`](Self::stop) is idempotent and also runs on drop; a stopped
/// graph cannot be restarted.
pub struct PipelineGraph {
    config: GraphConfig,
    state: PipelineState,
    slots: Vec<StageSlot>,
    links: Vec<Arc<RingBuffer>>,
    workers: Vec<Worker>,
    shared: Arc<PipelineShared>,
}

impl PipelineGraph {
    pub fn new(config: GraphConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            config,
            state: PipelineState::Constructed,
            slots: Vec::new(),
            links: Vec::new(),
            workers: Vec::new(),
            shared: Arc::new(PipelineShared::new(None)),
        })
    }

    /// Attach an observer. Must be called before the graph runs.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.shared = Arc::new(PipelineShared::new(Some(observer)));
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Tags in registration order, or in chain order once linked.
    pub fn stage_tags(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.tag.as_str()).collect()
    }

    /// Add a stage under a unique tag.
    pub fn register<S: Stage + 'static>(&mut self, tag: &str, stage: S) -> Result<(), CaptureError> {
        if self.state != PipelineState::Constructed {
            return Err(CaptureError::invalid_state("register a stage", self.state));
        }
        if tag.is_empty() {
            return Err(CaptureError::ConfigurationFailed("stage tag must not be empty".into()));
        }
        if self.slots.iter().any(|slot| slot.tag == tag) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "stage tag '{}' is already registered",
                tag
            )));
        }

        log::debug!("registered stage '{}' ({:?})", tag, stage.role());
        self.slots.push(StageSlot {
            tag: tag.to_string(),
            role: stage.role(),
            container: stage.container(),
            device: stage.device_info(),
            stage: Some(Box::new(stage)),
        });
        Ok(())
    }

    /// Wire the registered stages into a chain, in the given tag order.
    ///
    /// The chain must start with a source, end with a sink, and hold only
    /// transforms in between. Every registered stage must appear exactly
    /// once; a stage left out would have a dangling link.
    pub fn link(&mut self, order: &[&str]) -> Result<(), CaptureError> {
        if self.state != PipelineState::Constructed {
            return Err(CaptureError::invalid_state("link", self.state));
        }
        if order.len() < 2 {
            return Err(CaptureError::LinkFailed(
                "a pipeline needs at least a source and a sink".into(),
            ));
        }

        let last = order.len() - 1;
        for (i, tag) in order.iter().enumerate() {
            if order[..i].contains(tag) {
                return Err(CaptureError::LinkFailed(format!("stage '{}' is linked twice", tag)));
            }
            let slot = self
                .slots
                .iter()
                .find(|slot| slot.tag == *tag)
                .ok_or_else(|| CaptureError::LinkFailed(format!("unknown stage '{}'", tag)))?;

            match (i == 0, i == last, slot.role) {
                (true, _, StageRole::Source)
                | (false, true, StageRole::Sink)
                | (false, false, StageRole::Transform) => {}
                (false, true, StageRole::Transform) => {
                    return Err(CaptureError::LinkFailed(format!(
                        "transform '{}' has no output link",
                        tag
                    )))
                }
                (true, _, StageRole::Transform) => {
                    return Err(CaptureError::LinkFailed(format!(
                        "transform '{}' has no input link",
                        tag
                    )))
                }
                (_, _, role) => {
                    return Err(CaptureError::LinkFailed(format!(
                        "{:?} stage '{}' cannot sit at position {} of {}",
                        role,
                        tag,
                        i,
                        order.len()
                    )))
                }
            }
        }

        if let Some(unlinked) = self.slots.iter().find(|slot| !order.contains(&slot.tag.as_str())) {
            return Err(CaptureError::LinkFailed(format!(
                "stage '{}' is registered but not linked",
                unlinked.tag
            )));
        }

        self.slots
            .sort_by_key(|slot| order.iter().position(|tag| *tag == slot.tag));
        self.links = (0..last)
            .map(|i| {
                let capacity = if i + 1 == last {
                    self.config.sink_buffer_bytes
                } else {
                    self.config.ring_buffer_bytes
                };
                Arc::new(RingBuffer::new(capacity))
            })
            .collect();

        log::info!("pipeline linked: {}", order.join(" -> "));
        self.set_state(PipelineState::Linked);
        Ok(())
    }

    /// Start one worker thread per source and transform stage.
    pub fn run(&mut self) -> Result<(), CaptureError> {
        if self.state != PipelineState::Linked {
            return Err(CaptureError::invalid_state("run", self.state));
        }
        self.set_state(PipelineState::Running);

        let stage_timeout = self.config.stage_timeout();
        for i in 0..self.slots.len() {
            if self.slots[i].role == StageRole::Sink {
                continue;
            }
            let Some(stage) = self.slots[i].stage.take() else {
                continue;
            };
            let tag = self.slots[i].tag.clone();
            let running = Arc::new(AtomicBool::new(true));
            let io = StageIo::new(
                &tag,
                i.checked_sub(1).map(|prev| Arc::clone(&self.links[prev])),
                self.links.get(i).cloned(),
                Arc::clone(&running),
                stage_timeout,
                stage.output_timeout().unwrap_or(stage_timeout),
                self.config.stall_threshold,
                Arc::clone(&self.shared),
            );

            // std threads cannot be pinned; the hint is advisory.
            if let Some(core) = stage.affinity_hint() {
                log::debug!("[{}] worker prefers core {}", tag, core);
            }

            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("stage-{}", tag))
                .spawn(move || run_worker(stage, io, shared));

            match spawned {
                Ok(handle) => self.workers.push(Worker {
                    tag,
                    running,
                    handle,
                }),
                Err(e) => {
                    let err = CaptureError::StageFailed {
                        tag,
                        reason: format!("failed to spawn worker: {}", e),
                    };
                    self.shared.fail(err.clone());
                    self.stop();
                    return Err(err);
                }
            }
        }

        log::info!("pipeline running with {} worker(s)", self.workers.len());
        Ok(())
    }

    /// Mark the capture budget as met. Workers keep running, held back by
    /// ring buffer backpressure, until [`stop`](Self::stop).
    pub fn begin_draining(&mut self) -> Result<(), CaptureError> {
        if self.state != PipelineState::Running {
            return Err(CaptureError::invalid_state("drain", self.state));
        }
        self.set_state(PipelineState::Draining);
        Ok(())
    }

    /// Signal every worker, close every link, join the workers and release
    /// stages that never started. Safe to call in any state, any number of
    /// times.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }

        for worker in &self.workers {
            worker.running.store(false, Ordering::SeqCst);
        }
        for link in &self.links {
            link.close();
        }
        for worker in self.workers.drain(..) {
            if worker.handle.join().is_err() {
                log::error!("[{}] worker panicked", worker.tag);
                self.shared.fail(CaptureError::StageFailed {
                    tag: worker.tag,
                    reason: "worker panicked".into(),
                });
            }
        }
        for slot in &mut self.slots {
            if let Some(mut stage) = slot.stage.take() {
                stage.release();
            }
        }

        self.set_state(PipelineState::Stopped);
    }

    /// The terminal buffer the capture driver drains.
    pub fn sink(&self) -> Result<&RingBuffer, CaptureError> {
        if !self.state.has_links() {
            return Err(CaptureError::invalid_state("read the sink", self.state));
        }
        self.links
            .last()
            .map(|link| link.as_ref())
            .ok_or_else(|| CaptureError::LinkFailed("pipeline has no sink buffer".into()))
    }

    /// Layout of the bytes arriving at the sink.
    pub fn container(&self) -> Container {
        self.slots
            .iter()
            .find_map(|slot| slot.container)
            .unwrap_or(Container::Raw)
    }

    pub fn device_info(&self) -> Option<AudioDevice> {
        self.slots.iter().find_map(|slot| slot.device.clone())
    }

    pub fn diagnostics(&self) -> PipelineDiagnostics {
        self.shared.diagnostics()
    }

    /// First fatal error raised by a worker, if any.
    pub fn failure(&self) -> Option<CaptureError> {
        self.shared.failure()
    }

    pub(crate) fn shared(&self) -> &PipelineShared {
        &self.shared
    }

    fn set_state(&mut self, next: PipelineState) {
        debug_assert!(self.state.can_transition_to(next));
        log::info!("pipeline {} -> {}", self.state, next);
        self.state = next;
        if let Some(observer) = self.shared.observer() {
            observer.on_state_changed(next);
        }
    }
}

impl Drop for PipelineGraph {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(mut stage: Box<dyn Stage>, mut io: StageIo, shared: Arc<PipelineShared>) {
    log::debug!("[{}] worker started", io.tag());
    while io.is_running() {
        // A panic must still close the links, or neighbours and the driver
        // wait on them forever.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.process(&mut io)));
        match outcome {
            Ok(Ok(Flow::Continue)) => {}
            Ok(Ok(Flow::Finished)) => break,
            Ok(Err(err)) => {
                log::error!("[{}] stage failed: {}", io.tag(), err);
                shared.fail(err);
                break;
            }
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                log::error!("[{}] stage panicked: {}", io.tag(), reason);
                shared.fail(CaptureError::StageFailed {
                    tag: io.tag().to_string(),
                    reason: format!("stage panicked: {}", reason),
                });
                break;
            }
        }
    }
    io.close_links();
    stage.release();
    shared.emit(PipelineEvent::StageExited {
        tag: io.tag().to_string(),
    });
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".into()
    }
}
