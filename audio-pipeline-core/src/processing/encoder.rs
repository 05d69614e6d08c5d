use crate::models::audio_models::AudioFormat;
use crate::models::config::EncoderKind;
use crate::models::error::CaptureError;
use crate::processing::wav_format::{self, WAV_HEADER_SIZE};

/// Layout of the encoded stream, known before any byte is produced.
///
/// The capture driver uses it to separate header bytes from payload and
/// to rewrite the header once the payload length is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Raw,
    Wav(AudioFormat),
}

impl Container {
    pub fn kind(&self) -> EncoderKind {
        match self {
            Self::Raw => EncoderKind::PassThrough,
            Self::Wav(_) => EncoderKind::Wav,
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            Self::Raw => 0,
            Self::Wav(_) => WAV_HEADER_SIZE,
        }
    }

    /// Header describing exactly `payload_len` bytes, or `None` if the
    /// container has no header.
    pub fn finalized_header(&self, payload_len: u64) -> Result<Option<Vec<u8>>, CaptureError> {
        match self {
            Self::Raw => Ok(None),
            Self::Wav(format) => {
                let size = wav_format::data_size_field(payload_len)?;
                Ok(Some(wav_format::generate_wav_header(format, size).to_vec()))
            }
        }
    }
}

/// Format packaging applied by the encoder stage.
///
/// `header` is emitted once before any payload; `encode` must keep bytes
/// in the order they arrive.
pub trait FrameEncoder: Send {
    fn container(&self) -> Container;

    fn header(&self) -> Vec<u8>;

    fn encode(&mut self, pcm: &[u8], out: &mut Vec<u8>) -> Result<(), CaptureError>;
}

/// Forwards PCM unchanged with no header.
#[derive(Debug, Default, Clone)]
pub struct PassThroughEncoder;

impl FrameEncoder for PassThroughEncoder {
    fn container(&self) -> Container {
        Container::Raw
    }

    fn header(&self) -> Vec<u8> {
        Vec::new()
    }

    fn encode(&mut self, pcm: &[u8], out: &mut Vec<u8>) -> Result<(), CaptureError> {
        out.extend_from_slice(pcm);
        Ok(())
    }
}

/// Prefixes PCM with a RIFF/WAVE header.
///
/// With a declared length the header is final from the start; otherwise
/// it carries zero sizes until the driver patches it on close.
#[derive(Debug, Clone)]
pub struct WavEncoder {
    format: AudioFormat,
    declared_len: Option<u32>,
}

impl WavEncoder {
    pub fn new(format: AudioFormat, declared_len: Option<u64>) -> Result<Self, CaptureError> {
        format.validate()?;
        wav_format::byte_rate_field(&format)?;
        let declared_len = declared_len
            .map(wav_format::data_size_field)
            .transpose()?;
        Ok(Self {
            format,
            declared_len,
        })
    }
}

impl FrameEncoder for WavEncoder {
    fn container(&self) -> Container {
        Container::Wav(self.format)
    }

    fn header(&self) -> Vec<u8> {
        wav_format::generate_wav_header(&self.format, self.declared_len.unwrap_or(0)).to_vec()
    }

    fn encode(&mut self, pcm: &[u8], out: &mut Vec<u8>) -> Result<(), CaptureError> {
        out.extend_from_slice(pcm);
        Ok(())
    }
}

/// Build the encoder selected by `kind`.
///
/// `declared_len` is the payload length to write into the header up front,
/// when known.
pub fn build_encoder(
    kind: EncoderKind,
    format: AudioFormat,
    declared_len: Option<u64>,
) -> Result<Box<dyn FrameEncoder>, CaptureError> {
    Ok(match kind {
        EncoderKind::PassThrough => Box::new(PassThroughEncoder),
        EncoderKind::Wav => Box::new(WavEncoder::new(format, declared_len)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::wav_format::parse_wav_header;

    #[test]
    fn pass_through_is_identity() {
        let mut encoder = PassThroughEncoder;
        let mut out = Vec::new();
        encoder.encode(&[1, 2, 3], &mut out).unwrap();
        encoder.encode(&[4], &mut out).unwrap();

        assert!(encoder.header().is_empty());
        assert_eq!(out, vec![1, 2, 3, 4]);
        assert_eq!(encoder.container().header_len(), 0);
        assert_eq!(encoder.container().finalized_header(4).unwrap(), None);
    }

    #[test]
    fn wav_header_declares_known_length() {
        let format = AudioFormat::new(8000, 32, 1);
        let encoder = WavEncoder::new(format, Some(320_000)).unwrap();

        let parsed = parse_wav_header(&encoder.header()).unwrap();
        assert_eq!(parsed.data_size, 320_000);
        assert_eq!(parsed.sample_rate, 8000);
    }

    #[test]
    fn wav_deferred_length_is_patched_on_finalize() {
        let format = AudioFormat::new(16_000, 16, 2);
        let encoder = WavEncoder::new(format, None).unwrap();
        assert_eq!(parse_wav_header(&encoder.header()).unwrap().data_size, 0);

        let header = encoder.container().finalized_header(6400).unwrap().unwrap();
        assert_eq!(parse_wav_header(&header).unwrap().data_size, 6400);
    }

    #[test]
    fn build_encoder_selects_container() {
        let format = AudioFormat::default();
        let raw = build_encoder(EncoderKind::PassThrough, format, None).unwrap();
        let wav = build_encoder(EncoderKind::Wav, format, Some(32)).unwrap();

        assert_eq!(raw.container().kind(), EncoderKind::PassThrough);
        assert_eq!(wav.container(), Container::Wav(format));
    }

    #[test]
    fn wav_rejects_length_past_riff_limit() {
        let format = AudioFormat::new(96_000, 32, 2);
        assert!(matches!(
            WavEncoder::new(format, Some(u64::from(u32::MAX))),
            Err(CaptureError::EncodingFailed(_))
        ));
    }

    #[test]
    fn wav_rejects_byte_rate_past_header_field() {
        let format = AudioFormat::new(u32::MAX / 2, 32, 2);
        assert!(format.validate().is_ok());
        assert!(matches!(
            WavEncoder::new(format, None),
            Err(CaptureError::EncodingFailed(_))
        ));
        assert!(build_encoder(EncoderKind::PassThrough, format, None).is_ok());
    }
}
