use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::{AudioDevice, AudioFormat};
use super::config::EncoderKind;
use super::diagnostics::PipelineDiagnostics;

/// Result returned when a capture session completes successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    /// Audio bytes in the file, excluding any container header.
    pub payload_bytes: u64,
    /// Total file length including the header.
    pub file_bytes: u64,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Metadata stored alongside a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub format: AudioFormat,
    pub container: EncoderKind,
    pub payload_bytes: u64,
    pub duration_secs: f64,
    pub checksum: String,
    pub device: Option<AudioDevice>,
    pub diagnostics: PipelineDiagnostics,
}

impl RecordingMetadata {
    pub fn new(
        file_path: &str,
        format: AudioFormat,
        container: EncoderKind,
        payload_bytes: u64,
        checksum: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            format,
            container,
            payload_bytes,
            duration_secs: format.duration_of(payload_bytes),
            checksum: checksum.to_string(),
            device: None,
            diagnostics: PipelineDiagnostics::default(),
        }
    }

    pub fn with_device(mut self, device: Option<AudioDevice>) -> Self {
        self.device = device;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: PipelineDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn metadata_derives_duration_from_payload() {
        let format = AudioFormat::new(8000, 32, 1);
        let metadata =
            RecordingMetadata::new("/sdcard/rec.wav", format, EncoderKind::Wav, 48_000, "abc");

        assert_relative_eq!(metadata.duration_secs, 1.5);
        assert_eq!(metadata.id.len(), 36);
        assert!(metadata.device.is_none());
    }
}
