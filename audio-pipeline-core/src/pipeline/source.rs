use std::time::Duration;

use crate::models::audio_models::AudioDevice;
use crate::models::config::SourceConfig;
use crate::models::error::CaptureError;
use crate::pipeline::stage::{Flow, Stage, StageIo, StageRole};
use crate::processing::ring_buffer::Timeout;
use crate::traits::audio_interface::AudioInterface;

/// Hardware capture stage.
///
/// Reads one fixed-size frame per iteration from its [`AudioInterface`]
/// and pushes the bytes downstream. A short read is reported and only the
/// bytes actually received are forwarded, so the stream stays contiguous.
/// The stage owns the interface; releasing or dropping the stage releases
/// the peripheral.
pub struct SourceStage<A: AudioInterface> {
    interface: A,
    config: SourceConfig,
    frame: Vec<u8>,
    released: bool,
}

impl<A: AudioInterface> SourceStage<A> {
    /// Configure `interface` for `config.format`. Any failure here is fatal:
    /// the stage is never built around a peripheral it could not set up.
    pub fn new(mut interface: A, config: SourceConfig) -> Result<Self, CaptureError> {
        config.validate()?;

        let device = interface.device_info();
        if !interface.is_available() {
            return Err(CaptureError::DeviceNotAvailable(device.name));
        }
        interface.configure(&config.format)?;

        log::info!(
            "source '{}' configured: {} Hz, {}-bit, {} channel(s), {}-byte frames",
            device.name,
            config.format.sample_rate,
            config.format.bits_per_sample,
            config.format.channel_count,
            config.frame_bytes
        );

        Ok(Self {
            frame: vec![0; config.frame_bytes],
            interface,
            config,
            released: false,
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn read_timeout(&self) -> Duration {
        self.config.read_timeout()
    }
}

impl<A: AudioInterface> Stage for SourceStage<A> {
    fn role(&self) -> StageRole {
        StageRole::Source
    }

    fn process(&mut self, io: &mut StageIo) -> Result<Flow, CaptureError> {
        let timeout = self.read_timeout();
        let received = self.interface.read(&mut self.frame, timeout)?;

        io.count(|d| {
            d.hardware_reads += 1;
            d.hardware_bytes += received as u64;
        });
        if received < self.frame.len() {
            io.report_short_read(self.frame.len(), received);
        }
        if received == 0 {
            return Ok(Flow::Continue);
        }
        io.write_all(&self.frame[..received])
    }

    fn release(&mut self) {
        if !self.released {
            self.interface.release();
            self.released = true;
        }
    }

    fn affinity_hint(&self) -> Option<usize> {
        self.config.core_affinity
    }

    fn output_timeout(&self) -> Option<Timeout> {
        Some(self.config.output_timeout())
    }

    fn device_info(&self) -> Option<AudioDevice> {
        Some(self.interface.device_info())
    }
}

impl<A: AudioInterface> Drop for SourceStage<A> {
    fn drop(&mut self) {
        self.release();
    }
}
