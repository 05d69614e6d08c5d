//! Simulated audio interface for running pipelines without hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::audio_models::{AudioDevice, AudioFormat};
use crate::models::error::CaptureError;
use crate::traits::audio_interface::AudioInterface;

/// Period of the generated byte pattern. Prime, so it never lines up with
/// frame or chunk boundaries.
const PATTERN_PERIOD: u64 = 251;

/// An [`AudioInterface`] that generates a deterministic byte stream.
///
/// Byte `n` of the stream is [`SimulatedInterface::pattern_byte`]`(n)`, so a
/// test can verify ordering of anything that comes out of the pipeline.
/// Short reads and hardware failures can be injected, and reads can be
/// paced to the real byte rate of the configured format.
///
/// # Example
///
/// ```
/// use audio_pipeline_core::hardware::SimulatedInterface;
/// use audio_pipeline_core::traits::audio_interface::AudioInterface;
/// use audio_pipeline_core::AudioFormat;
/// use std::time::Duration;
///
/// let mut hw = SimulatedInterface::new().with_short_reads(2, 3);
/// hw.configure(&AudioFormat::default()).unwrap();
///
/// let mut frame = [0u8; 8];
/// assert_eq!(hw.read(&mut frame, Duration::from_millis(10)).unwrap(), 8);
/// assert_eq!(hw.read(&mut frame, Duration::from_millis(10)).unwrap(), 3);
/// assert_eq!(frame[0], SimulatedInterface::pattern_byte(8));
/// ```
#[derive(Debug)]
pub struct SimulatedInterface {
    device: AudioDevice,
    format: Option<AudioFormat>,
    produced: u64,
    reads: u64,
    short_read_every: Option<u64>,
    short_read_len: usize,
    fail_after_reads: Option<u64>,
    fail_configure: bool,
    available: bool,
    paced: bool,
    started: Option<Instant>,
    released: Arc<AtomicBool>,
}

impl SimulatedInterface {
    pub fn new() -> Self {
        Self {
            device: AudioDevice {
                id: "simulated-i2s".into(),
                name: "Simulated I2S input".into(),
                is_default: true,
            },
            format: None,
            produced: 0,
            reads: 0,
            short_read_every: None,
            short_read_len: 0,
            fail_after_reads: None,
            fail_configure: false,
            available: true,
            paced: false,
            started: None,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Value of byte `offset` in the generated stream.
    pub fn pattern_byte(offset: u64) -> u8 {
        (offset % PATTERN_PERIOD) as u8
    }

    /// The first `len` bytes of the generated stream.
    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len as u64).map(Self::pattern_byte).collect()
    }

    /// Every `every`-th read returns at most `len` bytes.
    pub fn with_short_reads(mut self, every: u64, len: usize) -> Self {
        self.short_read_every = Some(every.max(1));
        self.short_read_len = len;
        self
    }

    /// Reads after the first `reads` fail with a hardware error.
    pub fn failing_after(mut self, reads: u64) -> Self {
        self.fail_after_reads = Some(reads);
        self
    }

    /// `configure` fails, as a missing or misconfigured peripheral would.
    pub fn failing_configure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    /// Report the device as absent.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Deliver bytes no faster than the configured format's byte rate.
    pub fn paced(mut self) -> Self {
        self.paced = true;
        self
    }

    /// Flag set once the interface has been released.
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    /// Bytes delivered so far.
    pub fn bytes_produced(&self) -> u64 {
        self.produced
    }

    /// Bytes the hardware would have produced `elapsed` after starting.
    fn due_bytes(format: &AudioFormat, elapsed: Duration) -> u64 {
        format.target_bytes(elapsed).unwrap_or(u64::MAX)
    }
}

impl Default for SimulatedInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInterface for SimulatedInterface {
    fn is_available(&self) -> bool {
        self.available
    }

    fn configure(&mut self, format: &AudioFormat) -> Result<(), CaptureError> {
        if self.fail_configure {
            return Err(CaptureError::ConfigurationFailed(
                "simulated peripheral rejected configuration".into(),
            ));
        }
        format.validate()?;
        self.format = Some(*format);
        self.released.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, CaptureError> {
        let format = self
            .format
            .ok_or_else(|| CaptureError::HardwareError("interface not configured".into()))?;

        self.reads += 1;
        if self.fail_after_reads.is_some_and(|limit| self.reads > limit) {
            return Err(CaptureError::HardwareError(format!(
                "simulated bus fault on read {}",
                self.reads
            )));
        }

        let mut len = buf.len();
        if self.short_read_every.is_some_and(|n| self.reads % n == 0) {
            len = len.min(self.short_read_len);
        }

        if self.paced {
            let started = *self.started.get_or_insert_with(Instant::now);
            let wanted = self.produced + len as u64;
            let due = Duration::from_secs_f64(format.duration_of(wanted));
            let wait = due.saturating_sub(started.elapsed());
            thread::sleep(wait.min(timeout));
            if wait > timeout {
                let ready = Self::due_bytes(&format, started.elapsed());
                len = ready.saturating_sub(self.produced).min(len as u64) as usize;
            }
        } else if len == 0 && !buf.is_empty() {
            // A read that yields nothing has waited out its timeout.
            thread::sleep(timeout);
        }

        for (i, byte) in buf[..len].iter_mut().enumerate() {
            *byte = Self::pattern_byte(self.produced + i as u64);
        }
        self.produced += len as u64;
        Ok(len)
    }

    fn release(&mut self) {
        if self.format.take().is_some() {
            log::debug!("released {}", self.device.name);
        }
        self.released.store(true, Ordering::SeqCst);
    }

    fn device_info(&self) -> AudioDevice {
        self.device.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[test]
    fn stream_follows_pattern_across_reads() {
        let mut hw = SimulatedInterface::new();
        hw.configure(&AudioFormat::default()).unwrap();

        let mut out = Vec::new();
        let mut frame = [0u8; 100];
        for _ in 0..5 {
            let n = hw.read(&mut frame, WAIT).unwrap();
            out.extend_from_slice(&frame[..n]);
        }
        assert_eq!(out, SimulatedInterface::pattern(500));
    }

    #[test]
    fn short_reads_keep_stream_contiguous() {
        let mut hw = SimulatedInterface::new().with_short_reads(3, 7);
        hw.configure(&AudioFormat::default()).unwrap();

        let mut out = Vec::new();
        let mut frame = [0u8; 32];
        let mut lens = Vec::new();
        for _ in 0..6 {
            let n = hw.read(&mut frame, WAIT).unwrap();
            lens.push(n);
            out.extend_from_slice(&frame[..n]);
        }
        assert_eq!(lens, vec![32, 32, 7, 32, 32, 7]);
        assert_eq!(out, SimulatedInterface::pattern(out.len()));
    }

    #[test]
    fn unconfigured_read_fails() {
        let mut hw = SimulatedInterface::new();
        let mut frame = [0u8; 4];
        assert!(matches!(
            hw.read(&mut frame, WAIT),
            Err(CaptureError::HardwareError(_))
        ));
    }

    #[test]
    fn injected_failures() {
        let mut hw = SimulatedInterface::new().failing_configure();
        assert!(hw.configure(&AudioFormat::default()).is_err());

        let mut hw = SimulatedInterface::new().failing_after(1);
        hw.configure(&AudioFormat::default()).unwrap();
        let mut frame = [0u8; 4];
        assert!(hw.read(&mut frame, WAIT).is_ok());
        assert!(hw.read(&mut frame, WAIT).is_err());
    }

    #[test]
    fn release_sets_flag() {
        let mut hw = SimulatedInterface::new();
        let flag = hw.release_flag();
        hw.configure(&AudioFormat::default()).unwrap();
        assert!(!flag.load(Ordering::SeqCst));

        hw.release();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn paced_reads_track_byte_rate() {
        // 8 kHz * 4 bytes: 320 bytes every 10ms
        let mut hw = SimulatedInterface::new().paced();
        hw.configure(&AudioFormat::default()).unwrap();

        let started = Instant::now();
        let mut frame = [0u8; 320];
        for _ in 0..5 {
            assert_eq!(hw.read(&mut frame, Duration::from_secs(1)).unwrap(), 320);
        }
        assert!(started.elapsed() >= Duration::from_millis(45));
    }
}
