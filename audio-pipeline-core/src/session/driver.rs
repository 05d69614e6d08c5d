use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::models::config::{CaptureConfiguration, EncoderKind, ShortPopPolicy};
use crate::models::diagnostics::PipelineEvent;
use crate::models::error::{CaptureError, RingBufferError};
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::PipelineState;
use crate::pipeline::encoder_stage::EncoderStage;
use crate::pipeline::graph::PipelineGraph;
use crate::pipeline::sink::SinkStage;
use crate::pipeline::source::SourceStage;
use crate::processing::wav_format;
use crate::storage::metadata::write_metadata;
use crate::storage::writer::CaptureFileWriter;
use crate::traits::audio_interface::AudioInterface;
use crate::traits::destination::CaptureDestination;
use crate::traits::observer::PipelineObserver;

/// Tag of the hardware capture stage in graphs built by [`CaptureDriver::build_graph`].
pub const SOURCE_TAG: &str = "i2s";
/// Tag of the format packaging stage.
pub const ENCODER_TAG: &str = "encoder";
/// Tag of the terminal stage.
pub const SINK_TAG: &str = "sink";

/// Runs one bounded-duration capture on the caller's thread.
///
/// The driver drains the graph's sink buffer into a destination until
/// exactly `header + byte_rate × duration` bytes have been written, then
/// stops the graph, patches the container header with the final payload
/// length and returns a [`RecordingResult`]. The graph is stopped on every
/// exit path, so stages and peripherals are released before an error
/// reaches the caller.
///
/// ```text
/// [Source] → ring → [Encoder] → sink buffer ─pop─→ CaptureDriver ─append─→ file
/// ```
pub struct CaptureDriver {
    config: CaptureConfiguration,
}

impl CaptureDriver {
    pub fn new(config: CaptureConfiguration) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    /// Build the standard `source → encoder → sink` graph for this
    /// configuration around `interface`, linked and ready to run.
    pub fn build_graph<A: AudioInterface + 'static>(
        &self,
        interface: A,
        observer: Option<Arc<dyn PipelineObserver>>,
    ) -> Result<PipelineGraph, CaptureError> {
        let config = &self.config;
        let mut graph = PipelineGraph::new(config.graph.clone())?;
        if let Some(observer) = observer {
            graph = graph.with_observer(observer);
        }

        let target_bytes = config.target_bytes()?;
        // A deferred header is still patched with the full payload length.
        if config.encoder == EncoderKind::Wav {
            wav_format::data_size_field(target_bytes)?;
        }
        let declared_len = config.declare_length_up_front.then_some(target_bytes);

        graph.register(SOURCE_TAG, SourceStage::new(interface, config.source.clone())?)?;
        graph.register(
            ENCODER_TAG,
            EncoderStage::with_kind(
                config.encoder,
                config.format(),
                declared_len,
                config.source.frame_bytes,
            )?,
        )?;
        graph.register(SINK_TAG, SinkStage::new())?;
        graph.link(&[SOURCE_TAG, ENCODER_TAG, SINK_TAG])?;
        Ok(graph)
    }

    /// Capture into the configured destination file.
    ///
    /// The destination's directory must exist (the storage mount point);
    /// a file already at the destination is replaced.
    pub fn run(&self, graph: &mut PipelineGraph) -> Result<RecordingResult, CaptureError> {
        let destination = &self.config.destination;
        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut writer = match check_mounted(parent).and_then(|_| CaptureFileWriter::create(destination)) {
            Ok(writer) => writer,
            Err(err) => {
                graph.stop();
                return Err(report(graph, err));
            }
        };

        self.run_into(graph, &mut writer)
    }

    /// Capture into an arbitrary destination.
    pub fn run_into(
        &self,
        graph: &mut PipelineGraph,
        destination: &mut dyn CaptureDestination,
    ) -> Result<RecordingResult, CaptureError> {
        let started = Instant::now();
        let outcome = self.capture(graph, destination);
        graph.stop();

        let payload_bytes = outcome.map_err(|err| report(graph, err))?;
        log::info!(
            "captured {} payload bytes in {:.2}s",
            payload_bytes,
            started.elapsed().as_secs_f64()
        );

        let result = self
            .finalize(graph, destination, payload_bytes)
            .map_err(|err| report(graph, err))?;

        if let Some(observer) = graph.shared().observer() {
            observer.on_capture_finished(&result);
        }
        Ok(result)
    }

    /// Start the graph if needed, pump the sink, and enter draining.
    /// Returns the payload byte count.
    fn capture(
        &self,
        graph: &mut PipelineGraph,
        destination: &mut dyn CaptureDestination,
    ) -> Result<u64, CaptureError> {
        match graph.state() {
            PipelineState::Linked => graph.run()?,
            PipelineState::Running => {}
            state => return Err(CaptureError::invalid_state("capture", state)),
        }

        let header_len = graph.container().header_len() as u64;
        let target = header_len + self.config.target_bytes()?;
        log::info!(
            "capturing {:.2}s to {} ({} bytes including {}-byte header)",
            self.config.duration_secs,
            self.config.destination.display(),
            target,
            header_len
        );

        self.pump(graph, destination, target)?;
        graph.begin_draining()?;
        Ok(destination.bytes_written() - header_len)
    }

    fn pump(
        &self,
        graph: &PipelineGraph,
        destination: &mut dyn CaptureDestination,
        target: u64,
    ) -> Result<(), CaptureError> {
        let sink = graph.sink()?;
        let shared = graph.shared();
        let policy = self.config.short_pop_policy;
        let pop_timeout = self.config.pop_timeout();
        let stall_abort = self.config.stall_abort();

        let mut chunk = vec![0u8; self.config.chunk_bytes];
        let mut filled = 0usize;
        let mut written = destination.bytes_written();
        let mut idle_since: Option<Instant> = None;

        while written < target {
            if let Some(err) = graph.failure() {
                return Err(err);
            }

            // Never ask for more than the budget has left, so the file ends
            // exactly at the target.
            let want = (target - written).min(chunk.len() as u64) as usize;
            match sink.pop_into(&mut chunk[filled..want], pop_timeout) {
                Ok(received) => {
                    idle_since = None;
                    let requested = want - filled;
                    if received < requested {
                        shared.emit(PipelineEvent::ShortPop {
                            requested,
                            received,
                        });
                    }
                    filled += received;

                    if policy == ShortPopPolicy::AdvanceByActual || filled == want {
                        destination.append(&chunk[..filled])?;
                        shared.count(|d| d.bytes_written += filled as u64);
                        written += filled as u64;
                        filled = 0;
                    }
                }
                Err(RingBufferError::TimedOut) => {
                    shared.emit(PipelineEvent::PopTimeout {
                        tag: SINK_TAG.to_string(),
                    });
                    let since = *idle_since.get_or_insert_with(Instant::now);
                    if stall_abort.is_some_and(|limit| since.elapsed() >= limit) {
                        log::error!(
                            "no data from the pipeline for {:.1}s, aborting capture",
                            since.elapsed().as_secs_f64()
                        );
                        return Err(CaptureError::Timeout);
                    }
                }
                Err(RingBufferError::Closed) => {
                    return Err(graph.failure().unwrap_or_else(|| CaptureError::StageFailed {
                        tag: SINK_TAG.to_string(),
                        reason: format!("pipeline closed after {} of {} bytes", written, target),
                    }));
                }
            }
        }
        Ok(())
    }

    fn finalize(
        &self,
        graph: &PipelineGraph,
        destination: &mut dyn CaptureDestination,
        payload_bytes: u64,
    ) -> Result<RecordingResult, CaptureError> {
        let container = graph.container();
        let header = container.finalized_header(payload_bytes)?;
        let checksum = destination.finalize(header.as_deref())?;

        let format = self.config.format();
        let file_path = destination
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.destination.clone());

        let metadata = RecordingMetadata::new(
            &file_path.to_string_lossy(),
            format,
            container.kind(),
            payload_bytes,
            &checksum,
        )
        .with_device(graph.device_info())
        .with_diagnostics(graph.diagnostics());

        if self.config.write_metadata {
            if let Some(path) = destination.path() {
                write_metadata(&metadata, path)?;
            }
        }

        Ok(RecordingResult {
            file_path,
            payload_bytes,
            file_bytes: destination.bytes_written(),
            duration_secs: format.duration_of(payload_bytes),
            metadata,
            checksum,
        })
    }
}

fn check_mounted(dir: &Path) -> Result<(), CaptureError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(CaptureError::StorageUnavailable(dir.display().to_string()))
    }
}

fn report(graph: &PipelineGraph, err: CaptureError) -> CaptureError {
    log::error!("capture failed ({:?}): {}", err.kind(), err);
    if let Some(observer) = graph.shared().observer() {
        observer.on_error(&err);
    }
    err
}
