use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::AudioFormat;
use super::error::CaptureError;
use crate::processing::ring_buffer::Timeout;

/// Container written by the encoder stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    /// Raw PCM, no header.
    PassThrough,
    /// 44-byte RIFF/WAVE header followed by PCM.
    Wav,
}

/// How the capture driver accounts for a pop that returns less than the
/// chunk it asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortPopPolicy {
    /// Write what arrived, advance the running total by that amount, and
    /// ask for the next chunk.
    AdvanceByActual,
    /// Keep popping until the chunk is full before writing it.
    FillChunk,
}

/// Hardware capture stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub format: AudioFormat,

    /// Bytes requested from the hardware per read (default: 320).
    pub frame_bytes: usize,

    /// Preferred CPU core for the capture worker (default: core 0).
    pub core_affinity: Option<usize>,

    /// How long a push may block before it is reported as an overrun.
    /// `None` waits indefinitely (default).
    pub output_timeout_ms: Option<u64>,

    /// Upper bound on one blocking hardware read, so the worker notices a
    /// stop request (default: 500).
    pub read_timeout_ms: u64,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        self.format.validate()?;
        if self.frame_bytes == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "frame size must be positive".into(),
            ));
        }
        let block = self.format.block_align() as usize;
        if self.frame_bytes % block != 0 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "frame size {} is not a multiple of the {}-byte block",
                self.frame_bytes, block
            )));
        }
        if self.read_timeout_ms == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "hardware read timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn output_timeout(&self) -> Timeout {
        self.output_timeout_ms
            .map(|ms| Timeout::After(Duration::from_millis(ms)))
            .unwrap_or(Timeout::Infinite)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            frame_bytes: 320,
            core_affinity: Some(0),
            output_timeout_ms: None,
            read_timeout_ms: 500,
        }
    }
}

/// Ring buffer sizing and worker timing for a pipeline graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Capacity of each inter-stage ring buffer (default: 8 KiB).
    pub ring_buffer_bytes: usize,

    /// Capacity of the terminal sink buffer (default: 8 KiB).
    pub sink_buffer_bytes: usize,

    /// Push/pop timeout for stages without their own deadline (default: 100).
    pub stage_timeout_ms: u64,

    /// Consecutive timeouts before a stall diagnostic is raised (default: 20).
    pub stall_threshold: u32,
}

impl GraphConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.ring_buffer_bytes == 0 || self.sink_buffer_bytes == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "ring buffer capacity must be positive".into(),
            ));
        }
        if self.stage_timeout_ms == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "stage timeout must be positive".into(),
            ));
        }
        if self.stall_threshold == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "stall threshold must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Timeout {
        Timeout::After(Duration::from_millis(self.stage_timeout_ms))
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            ring_buffer_bytes: 8 * 1024,
            sink_buffer_bytes: 8 * 1024,
            stage_timeout_ms: 100,
            stall_threshold: 20,
        }
    }
}

/// Configuration for one bounded-duration capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    pub source: SourceConfig,

    pub graph: GraphConfig,

    /// Requested capture length in seconds (default: 10).
    pub duration_secs: f64,

    /// File the recording is written to. Its parent directory is the
    /// storage mount point and must already exist.
    pub destination: PathBuf,

    pub encoder: EncoderKind,

    /// Write the final data length into the header before capture starts.
    /// When false the header carries a zero length that is patched on close.
    pub declare_length_up_front: bool,

    /// Bytes the driver requests per sink pop (default: 320).
    pub chunk_bytes: usize,

    /// How long one sink pop may block (default: 500).
    pub pop_timeout_ms: u64,

    pub short_pop_policy: ShortPopPolicy,

    /// Abort the session if the sink yields nothing for this long.
    /// `None` waits indefinitely.
    pub stall_abort_ms: Option<u64>,

    /// Write a `.metadata.json` sidecar next to the recording.
    pub write_metadata: bool,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), CaptureError> {
        self.source.validate()?;
        self.graph.validate()?;
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "capture duration must be positive, got {}",
                self.duration_secs
            )));
        }
        if self.chunk_bytes == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "chunk size must be positive".into(),
            ));
        }
        if self.pop_timeout_ms == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "pop timeout must be positive".into(),
            ));
        }
        if self.destination.file_name().is_none() {
            return Err(CaptureError::ConfigurationFailed(format!(
                "destination {} has no file name",
                self.destination.display()
            )));
        }
        Ok(())
    }

    pub fn format(&self) -> AudioFormat {
        self.source.format
    }

    /// Requested duration, rounded to the nearest nanosecond so decimal
    /// lengths like 0.3s map to whole frames.
    pub fn duration(&self) -> Duration {
        Duration::from_nanos((self.duration_secs * 1e9).round() as u64)
    }

    /// Payload bytes the session must capture.
    pub fn target_bytes(&self) -> Result<u64, CaptureError> {
        self.format().target_bytes(self.duration())
    }

    pub fn pop_timeout(&self) -> Timeout {
        Timeout::After(Duration::from_millis(self.pop_timeout_ms))
    }

    pub fn stall_abort(&self) -> Option<Duration> {
        self.stall_abort_ms.map(Duration::from_millis)
    }

    /// Load and validate a configuration from a JSON file. Missing fields
    /// take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let json = fs::read_to_string(path).map_err(|e| {
            CaptureError::ConfigurationFailed(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            CaptureError::ConfigurationFailed(format!(
                "failed to parse {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            graph: GraphConfig::default(),
            duration_secs: 10.0,
            destination: PathBuf::from("/sdcard/recording.wav"),
            encoder: EncoderKind::Wav,
            declare_length_up_front: true,
            chunk_bytes: 320,
            pop_timeout_ms: 500,
            short_pop_policy: ShortPopPolicy::AdvanceByActual,
            stall_abort_ms: Some(5000),
            write_metadata: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::ChannelMask;

    #[test]
    fn defaults_validate() {
        let config = CaptureConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_bytes().unwrap(), 320_000);
        assert_eq!(config.source.output_timeout(), Timeout::Infinite);
        assert_eq!(config.format().channel_mask, ChannelMask::LEFT);
    }

    #[test]
    fn frame_must_hold_whole_blocks() {
        let config = SourceConfig {
            frame_bytes: 322,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CaptureError::ConfigurationFailed(_))
        ));
    }

    #[test]
    fn rejects_non_positive_duration() {
        for duration_secs in [0.0, -1.0, f64::NAN] {
            let config = CaptureConfiguration {
                duration_secs,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{duration_secs}");
        }
    }

    #[test]
    fn loads_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        fs::write(
            &path,
            r#"{
                "duration_secs": 2.5,
                "encoder": "pass_through",
                "source": { "format": { "sample_rate": 16000, "bits_per_sample": 16,
                                        "channel_count": 2, "channel_mask": 3 } }
            }"#,
        )
        .unwrap();

        let config = CaptureConfiguration::from_json_file(&path).unwrap();
        assert_eq!(config.encoder, EncoderKind::PassThrough);
        assert_eq!(config.format().sample_rate, 16_000);
        assert_eq!(config.chunk_bytes, 320);
        assert_eq!(config.target_bytes().unwrap(), 16_000 * 4 * 5 / 2);
    }

    #[test]
    fn invalid_json_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            CaptureConfiguration::from_json_file(&path),
            Err(CaptureError::ConfigurationFailed(_))
        ));
    }
}
