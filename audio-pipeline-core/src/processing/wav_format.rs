//! WAV container header generation and parsing.
//!
//! Produces the standard 44-byte RIFF header for integer PCM and provides
//! helpers for rewriting the size fields once the payload length is known.

use crate::models::audio_models::AudioFormat;
use crate::models::error::CaptureError;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Largest payload a RIFF size field can describe.
pub const WAV_MAX_DATA_SIZE: u64 = (u32::MAX - 36) as u64;

/// Decoded fields of a 44-byte PCM WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
    pub riff_size: u32,
}

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bits / 8
/// [32-33]  block_align = channels * bits / 8
/// [34-35]  bits_per_sample
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(format: &AudioFormat, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = u32::try_from(format.byte_rate()).unwrap_or(u32::MAX);
    let block_align = format.block_align() as u16;

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&format.channel_count.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&format.bits_per_sample.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    patch_data_size(&mut header, data_size);

    header
}

/// Rewrite the RIFF chunk size (offset 4) and data size (offset 40).
pub fn patch_data_size(header: &mut [u8], data_size: u32) {
    let riff_size = data_size.saturating_add(36);
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
}

/// Convert a payload length to the header's 32-bit size field.
pub fn data_size_field(payload_len: u64) -> Result<u32, CaptureError> {
    if payload_len > WAV_MAX_DATA_SIZE {
        return Err(CaptureError::EncodingFailed(format!(
            "{} payload bytes exceed the WAV size limit of {}",
            payload_len, WAV_MAX_DATA_SIZE
        )));
    }
    Ok(payload_len as u32)
}

/// The header's 32-bit byte rate field for `format`.
pub fn byte_rate_field(format: &AudioFormat) -> Result<u32, CaptureError> {
    u32::try_from(format.byte_rate()).map_err(|_| {
        CaptureError::EncodingFailed(format!(
            "byte rate {} does not fit a WAV header",
            format.byte_rate()
        ))
    })
}

/// Parse and validate a PCM WAV header.
pub fn parse_wav_header(bytes: &[u8]) -> Result<WavHeader, CaptureError> {
    if bytes.len() < WAV_HEADER_SIZE {
        return Err(CaptureError::EncodingFailed(format!(
            "header is {} bytes, expected {}",
            bytes.len(),
            WAV_HEADER_SIZE
        )));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(CaptureError::EncodingFailed("missing RIFF/WAVE magic".into()));
    }
    if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
        return Err(CaptureError::EncodingFailed("unexpected chunk layout".into()));
    }
    if read_u16(bytes, 20) != 1 {
        return Err(CaptureError::EncodingFailed("not integer PCM".into()));
    }

    Ok(WavHeader {
        riff_size: read_u32(bytes, 4),
        channels: read_u16(bytes, 22),
        sample_rate: read_u32(bytes, 24),
        byte_rate: read_u32(bytes, 28),
        block_align: read_u16(bytes, 32),
        bits_per_sample: read_u16(bytes, 34),
        data_size: read_u32(bytes, 40),
    })
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
