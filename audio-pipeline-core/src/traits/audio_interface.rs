use std::time::Duration;

use crate::models::audio_models::{AudioDevice, AudioFormat};
use crate::models::error::CaptureError;

/// Hardware audio input feeding a source stage.
///
/// Implemented by:
/// - `SimulatedInterface` (deterministic test pattern, this crate)
/// - `CpalInput` (host audio devices, `audio-pipeline-cpal`)
///
/// The source stage owns its interface exclusively and calls every method
/// from its own worker thread once the pipeline runs.
pub trait AudioInterface: Send {
    /// Whether the device backing this interface is present.
    fn is_available(&self) -> bool;

    /// Program the peripheral for `format`. Failure is fatal for the
    /// source stage being built.
    fn configure(&mut self, format: &AudioFormat) -> Result<(), CaptureError>;

    /// Fill `buf` with captured PCM, blocking until it is full or `timeout`
    /// elapses. Returns the byte count, which may be short.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, CaptureError>;

    /// Stop the peripheral and free it. Called once when the stage is
    /// released; must tolerate being called on an unconfigured interface.
    fn release(&mut self);

    /// Information about the device backing this interface.
    fn device_info(&self) -> AudioDevice;
}
