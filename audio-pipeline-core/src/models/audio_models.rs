use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Bitmask of the physical channels a source captures.
///
/// Bit `n` selects hardware channel `n`; bit 0 is the left slot of an I2S
/// frame, bit 1 the right slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMask(u32);

impl ChannelMask {
    pub const LEFT: Self = Self(0b01);
    pub const RIGHT: Self = Self(0b10);
    pub const STEREO: Self = Self(0b11);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Mask selecting the first `count` channels.
    pub fn first(count: u16) -> Self {
        match count {
            0 => Self(0),
            32.. => Self(u32::MAX),
            n => Self((1u32 << n) - 1),
        }
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Number of active channels.
    pub const fn count(self) -> u16 {
        self.0.count_ones() as u16
    }

    pub const fn contains(self, channel: usize) -> bool {
        channel < 32 && self.0 & (1 << channel) != 0
    }

    /// Indices of the active channels, lowest first.
    pub fn channels(self) -> impl Iterator<Item = usize> {
        (0..32).filter(move |&ch| self.contains(ch))
    }
}

/// PCM stream layout shared by every stage of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Bits per sample. Valid values: 16, 24, 32.
    pub bits_per_sample: u16,
    /// Interleaved channels in the stream.
    pub channel_count: u16,
    /// Which physical channels the hardware delivers.
    pub channel_mask: ChannelMask,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, bits_per_sample: u16, channel_count: u16) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channel_count,
            channel_mask: ChannelMask::first(channel_count),
        }
    }

    /// Select specific physical channels; the channel count follows the mask.
    pub fn with_channel_mask(mut self, mask: ChannelMask) -> Self {
        self.channel_mask = mask;
        self.channel_count = mask.count();
        self
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_rate == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "sample rate must be positive".into(),
            ));
        }
        if ![16, 24, 32].contains(&self.bits_per_sample) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported bit depth: {}",
                self.bits_per_sample
            )));
        }
        if self.channel_count == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "channel count must be positive".into(),
            ));
        }
        if self.channel_mask.count() != self.channel_count {
            return Err(CaptureError::ConfigurationFailed(format!(
                "channel mask {:#b} selects {} channels, expected {}",
                self.channel_mask.bits(),
                self.channel_mask.count(),
                self.channel_count
            )));
        }
        Ok(())
    }

    pub fn bytes_per_sample(&self) -> u32 {
        u32::from(self.bits_per_sample / 8)
    }

    /// Bytes in one frame (one sample for every active channel).
    pub fn block_align(&self) -> u32 {
        self.bytes_per_sample() * u32::from(self.channel_count)
    }

    /// `sample_rate × bytes_per_sample × channel_count`.
    pub fn byte_rate(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.block_align())
    }

    /// Payload bytes produced over `duration`, rounded down to whole frames.
    pub fn target_bytes(&self, duration: Duration) -> Result<u64, CaptureError> {
        let raw = u128::from(self.byte_rate()) * duration.as_nanos() / 1_000_000_000;
        let block = u128::from(self.block_align().max(1));
        u64::try_from(raw - raw % block).map_err(|_| {
            CaptureError::ConfigurationFailed(format!(
                "capture of {:?} does not fit a 64-bit byte count",
                duration
            ))
        })
    }

    /// Duration covered by `bytes` of payload.
    pub fn duration_of(&self, bytes: u64) -> f64 {
        match self.byte_rate() {
            0 => 0.0,
            rate => bytes as f64 / rate as f64,
        }
    }
}

impl Default for AudioFormat {
    /// 8 kHz, 32-bit, left slot only.
    fn default() -> Self {
        Self::new(8000, 32, 1).with_channel_mask(ChannelMask::LEFT)
    }
}

/// An audio input device a source can be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_rate_mono_32bit() {
        let format = AudioFormat::new(8000, 32, 1);
        assert_eq!(format.byte_rate(), 32_000);
        assert_eq!(format.block_align(), 4);
    }

    #[test]
    fn target_bytes_ten_seconds() {
        let format = AudioFormat::new(8000, 32, 1);
        assert_eq!(
            format.target_bytes(Duration::from_secs(10)).unwrap(),
            320_000
        );
    }

    #[test]
    fn target_bytes_full_day_96k_stereo() {
        let format = AudioFormat::new(96_000, 32, 2);
        let day = Duration::from_secs(24 * 60 * 60);
        assert_eq!(format.target_bytes(day).unwrap(), 96_000 * 4 * 2 * 86_400);
    }

    #[test]
    fn target_bytes_rounds_to_whole_frames() {
        let format = AudioFormat::new(44_100, 24, 2);
        let bytes = format.target_bytes(Duration::from_millis(333)).unwrap();
        assert_eq!(bytes % 6, 0);
        assert!(bytes <= 44_100 * 6 * 333 / 1000);
    }

    #[test]
    fn validate_rejects_bad_formats() {
        assert!(AudioFormat::new(0, 16, 1).validate().is_err());
        assert!(AudioFormat::new(8000, 20, 1).validate().is_err());
        assert!(AudioFormat::new(8000, 16, 0).validate().is_err());

        let mut mismatched = AudioFormat::new(8000, 16, 2);
        mismatched.channel_mask = ChannelMask::LEFT;
        assert!(mismatched.validate().is_err());
    }

    #[test]
    fn default_is_left_only_32bit() {
        let format = AudioFormat::default();
        assert!(format.validate().is_ok());
        assert_eq!(format.channel_mask, ChannelMask::LEFT);
        assert_eq!(format.channel_count, 1);
        assert_eq!(format.bits_per_sample, 32);
    }

    #[test]
    fn channel_mask_helpers() {
        assert_eq!(ChannelMask::first(2), ChannelMask::STEREO);
        assert_eq!(ChannelMask::RIGHT.count(), 1);
        assert_eq!(ChannelMask::from_bits(0b101).channels().collect::<Vec<_>>(), vec![0, 2]);

        let right_only = AudioFormat::new(16_000, 16, 2).with_channel_mask(ChannelMask::RIGHT);
        assert_eq!(right_only.channel_count, 1);
        assert!(right_only.validate().is_ok());
    }
}
