//! Host audio input over cpal.
//!
//! The cpal callback converts each buffer to integer PCM and pushes it into
//! a core [`RingBuffer`]; [`AudioInterface::read`] pops from that buffer, so
//! a source stage sees the same blocking frame reads it would get from an
//! I2S peripheral.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use parking_lot::Mutex;

use audio_pipeline_core::models::audio_models::{AudioDevice, AudioFormat};
use audio_pipeline_core::models::error::{CaptureError, RingBufferError};
use audio_pipeline_core::processing::ring_buffer::{RingBuffer, Timeout};
use audio_pipeline_core::traits::audio_interface::AudioInterface;

use crate::device_enumerator::find_input_device;
use crate::pcm;

/// Capture buffer between the cpal callback and `read`: one second of audio.
const BUFFER_SECONDS: u64 = 1;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// The running stream. `cpal::Stream` is not `Send` on every host, so it
/// lives on its own thread and is dropped there.
struct StreamThread {
    running: Arc<AtomicBool>,
    buffer: Arc<RingBuffer>,
    dropped: Arc<AtomicU64>,
    stream_error: Arc<Mutex<Option<String>>>,
    handle: thread::JoinHandle<()>,
}

/// [`AudioInterface`] over a cpal input device.
///
/// Opens the device at the requested sample rate with its native channel
/// count, keeps the channels selected by the format's channel mask, and
/// converts samples to little-endian PCM at the requested bit depth.
pub struct CpalInput {
    device_name: Option<String>,
    stream: Option<StreamThread>,
}

impl CpalInput {
    /// The host's default input device.
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            stream: None,
        }
    }

    /// The input device named `name`, as reported by
    /// [`list_input_devices`](crate::list_input_devices).
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            stream: None,
        }
    }

    /// Bytes discarded because `read` fell behind the callback.
    pub fn dropped_bytes(&self) -> u64 {
        self.stream
            .as_ref()
            .map(|s| s.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl AudioInterface for CpalInput {
    fn is_available(&self) -> bool {
        find_input_device(self.device_name.as_deref()).is_some()
    }

    fn configure(&mut self, format: &AudioFormat) -> Result<(), CaptureError> {
        format.validate()?;
        self.release();

        let capacity = format.byte_rate().saturating_mul(BUFFER_SECONDS).max(1) as usize;
        let buffer = Arc::new(RingBuffer::new(capacity));
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));
        let stream_error = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = {
            let device_name = self.device_name.clone();
            let format = *format;
            let buffer = Arc::clone(&buffer);
            let running = Arc::clone(&running);
            let dropped = Arc::clone(&dropped);
            let stream_error = Arc::clone(&stream_error);
            thread::Builder::new()
                .name("cpal-input".into())
                .spawn(move || {
                    let stream = match open_stream(device_name.as_deref(), &format, buffer, dropped, stream_error) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    while running.load(Ordering::SeqCst) {
                        thread::park_timeout(Duration::from_millis(100));
                    }
                    drop(stream);
                })
                .map_err(|e| CaptureError::HardwareError(format!("failed to spawn input thread: {}", e)))?
        };

        let started = ready_rx.recv_timeout(STARTUP_TIMEOUT).unwrap_or_else(|_| {
            Err(CaptureError::ConfigurationFailed(
                "input stream did not start".into(),
            ))
        });
        if let Err(e) = started {
            running.store(false, Ordering::SeqCst);
            handle.thread().unpark();
            let _ = handle.join();
            return Err(e);
        }

        log::info!(
            "cpal input started: {} Hz, {}-bit, channels {:#b}",
            format.sample_rate,
            format.bits_per_sample,
            format.channel_mask.bits()
        );
        self.stream = Some(StreamThread {
            running,
            buffer,
            dropped,
            stream_error,
            handle,
        });
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, CaptureError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| CaptureError::HardwareError("input stream not configured".into()))?;
        if let Some(err) = stream.stream_error.lock().take() {
            return Err(CaptureError::HardwareError(err));
        }

        let deadline = Instant::now() + timeout;
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match stream.buffer.pop_into(&mut buf[filled..], Timeout::After(remaining)) {
                Ok(n) => filled += n,
                Err(RingBufferError::TimedOut) => break,
                Err(RingBufferError::Closed) => {
                    return Err(CaptureError::HardwareError("input stream closed".into()))
                }
            }
        }
        Ok(filled)
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.running.store(false, Ordering::SeqCst);
            stream.buffer.close();
            stream.handle.thread().unpark();
            if stream.handle.join().is_err() {
                log::error!("cpal input thread panicked");
            }
            let dropped = stream.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                log::warn!("cpal input dropped {} bytes while the reader lagged", dropped);
            }
            log::info!("cpal input stopped");
        }
    }

    fn device_info(&self) -> AudioDevice {
        let name = find_input_device(self.device_name.as_deref())
            .and_then(|d| d.name().ok())
            .or_else(|| self.device_name.clone())
            .unwrap_or_else(|| "Default Input".into());
        AudioDevice {
            id: name.clone(),
            name,
            is_default: self.device_name.is_none(),
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_stream(
    device_name: Option<&str>,
    format: &AudioFormat,
    buffer: Arc<RingBuffer>,
    dropped: Arc<AtomicU64>,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, CaptureError> {
    let device = find_input_device(device_name).ok_or_else(|| {
        CaptureError::DeviceNotAvailable(device_name.unwrap_or("default input").to_string())
    })?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::ConfigurationFailed(format!("no default input config: {}", e)))?;

    let channels = supported.channels();
    let selected: Vec<usize> = format.channel_mask.channels().collect();
    if selected.iter().any(|&ch| ch >= usize::from(channels)) {
        return Err(CaptureError::ConfigurationFailed(format!(
            "channel mask {:#b} needs more than the device's {} channel(s)",
            format.channel_mask.bits(),
            channels
        )));
    }

    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let sink = CallbackSink {
        channels: usize::from(channels),
        selected,
        bits: format.bits_per_sample,
        block: format.block_align() as usize,
        buffer,
        dropped,
        samples: Vec::new(),
        bytes: Vec::new(),
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build::<f32>(&device, &config, sink, stream_error),
        cpal::SampleFormat::I16 => build::<i16>(&device, &config, sink, stream_error),
        cpal::SampleFormat::I32 => build::<i32>(&device, &config, sink, stream_error),
        cpal::SampleFormat::U16 => build::<u16>(&device, &config, sink, stream_error),
        other => {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported device sample format {:?}",
                other
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| CaptureError::HardwareError(format!("failed to start input stream: {}", e)))?;
    Ok(stream)
}

fn build<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut sink: CallbackSink,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| sink.deliver(data),
            move |err: cpal::StreamError| {
                log::error!("cpal stream error: {}", err);
                *stream_error.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to build input stream: {}", e)))
}

/// State owned by the cpal data callback.
struct CallbackSink {
    channels: usize,
    selected: Vec<usize>,
    bits: u16,
    block: usize,
    buffer: Arc<RingBuffer>,
    dropped: Arc<AtomicU64>,
    samples: Vec<f32>,
    bytes: Vec<u8>,
}

impl CallbackSink {
    /// Never blocks: whole frames that do not fit are dropped and counted.
    fn deliver<T>(&mut self, data: &[T])
    where
        T: Sample,
        f32: FromSample<T>,
    {
        self.samples.clear();
        self.samples.extend(data.iter().map(|&s| s.to_sample::<f32>()));
        self.bytes.clear();
        pcm::encode_frames(&self.samples, self.channels, &self.selected, self.bits, &mut self.bytes);

        let free = self.buffer.free_space();
        let fits = self.bytes.len().min(free - free % self.block.max(1));
        let pushed = match self.buffer.push(&self.bytes[..fits], Timeout::NonBlocking) {
            Ok(n) => n,
            Err(_) => 0,
        };
        let lost = (self.bytes.len() - pushed) as u64;
        if lost > 0 {
            self.dropped.fetch_add(lost, Ordering::Relaxed);
        }
    }
}
