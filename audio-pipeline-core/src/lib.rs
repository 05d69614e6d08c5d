//! # audio-pipeline-core
//!
//! Staged audio capture pipeline.
//!
//! A hardware source, a format-encoding stage and a terminal sink buffer are
//! chained through bounded ring buffers and run on their own threads, while a
//! capture driver on the caller's thread drains the sink into a file until a
//! fixed duration of audio has been written. Host audio backends implement
//! the `AudioInterface` trait and plug into the generic `SourceStage`.
//!
//! ## Architecture
//!
//! ```text
//! audio-pipeline-core (this crate)
//! ├── traits/       ← AudioInterface, CaptureDestination, PipelineObserver
//! ├── models/       ← CaptureError, PipelineState, CaptureConfiguration, AudioFormat, etc.
//! ├── processing/   ← RingBuffer, WAV header generation/parsing, frame encoders
//! ├── pipeline/     ← Stage trait, SourceStage, EncoderStage, SinkStage, PipelineGraph
//! ├── session/      ← CaptureDriver (bounded-duration capture)
//! ├── storage/      ← CaptureFileWriter, metadata sidecar
//! └── hardware/     ← SimulatedInterface
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use audio_pipeline_core::{CaptureConfiguration, CaptureDriver, SimulatedInterface};
//!
//! # fn main() -> Result<(), audio_pipeline_core::CaptureError> {
//! let driver = CaptureDriver::new(CaptureConfiguration::default())?;
//! let mut graph = driver.build_graph(SimulatedInterface::new().paced(), None)?;
//! let result = driver.run(&mut graph)?;
//! println!("{} bytes, sha256 {}", result.file_bytes, result.checksum);
//! # Ok(())
//! # }
//! ```

pub mod hardware;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use hardware::SimulatedInterface;
pub use models::audio_models::{AudioDevice, AudioFormat, ChannelMask};
pub use models::config::{CaptureConfiguration, EncoderKind, GraphConfig, ShortPopPolicy, SourceConfig};
pub use models::diagnostics::{PipelineDiagnostics, PipelineEvent};
pub use models::error::{CaptureError, ErrorKind, RingBufferError};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::PipelineState;
pub use pipeline::{EncoderStage, PipelineGraph, SinkStage, SourceStage, Stage, StageRole};
pub use processing::encoder::{Container, FrameEncoder, PassThroughEncoder, WavEncoder};
pub use processing::ring_buffer::{RingBuffer, Timeout};
pub use session::CaptureDriver;
pub use storage::writer::CaptureFileWriter;
pub use traits::audio_interface::AudioInterface;
pub use traits::destination::CaptureDestination;
pub use traits::observer::PipelineObserver;
