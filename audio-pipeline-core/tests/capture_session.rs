use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use audio_pipeline_core::processing::wav_format::{parse_wav_header, WAV_HEADER_SIZE};
use audio_pipeline_core::storage::metadata::read_metadata;
use audio_pipeline_core::{
    AudioFormat, CaptureConfiguration, CaptureDestination, CaptureDriver, CaptureError,
    EncoderKind, ErrorKind, PipelineEvent, PipelineObserver, PipelineState, RecordingResult,
    SimulatedInterface, SourceConfig,
};
use parking_lot::Mutex;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config(dir: &Path, duration_secs: f64) -> CaptureConfiguration {
    CaptureConfiguration {
        duration_secs,
        destination: dir.join("recording.wav"),
        ..CaptureConfiguration::default()
    }
}

fn capture(
    config: CaptureConfiguration,
    hw: SimulatedInterface,
) -> (Result<RecordingResult, CaptureError>, PipelineState) {
    let driver = CaptureDriver::new(config).unwrap();
    let mut graph = driver.build_graph(hw, None).unwrap();
    let result = driver.run(&mut graph);
    (result, graph.state())
}

#[test]
fn ten_seconds_of_8khz_32bit_mono_is_320000_payload_bytes() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    let (result, state) = capture(config(dir.path(), 10.0), SimulatedInterface::new());
    let result = result.unwrap();

    assert_eq!(state, PipelineState::Stopped);
    assert_eq!(result.payload_bytes, 320_000);
    assert_eq!(result.file_bytes, 320_000 + WAV_HEADER_SIZE as u64);
    assert!((result.duration_secs - 10.0).abs() < 1e-9);

    let contents = fs::read(&result.file_path).unwrap();
    assert_eq!(contents.len(), 320_044);

    let header = parse_wav_header(&contents).unwrap();
    assert_eq!(header.sample_rate, 8000);
    assert_eq!(header.bits_per_sample, 32);
    assert_eq!(header.channels, 1);
    assert_eq!(header.data_size, 320_000);
    assert_eq!(header.riff_size, 320_036);
}

#[test]
fn pre_existing_destination_is_fully_replaced() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 0.1);
    fs::write(&config.destination, vec![0xAB; 1 << 20]).unwrap();

    let (result, _) = capture(config, SimulatedInterface::new());
    let result = result.unwrap();

    let contents = fs::read(&result.file_path).unwrap();
    assert_eq!(contents.len(), WAV_HEADER_SIZE + 3200);
    assert!(!contents[WAV_HEADER_SIZE..].iter().all(|&b| b == 0xAB));
    assert_eq!(&contents[WAV_HEADER_SIZE..], &SimulatedInterface::pattern(3200)[..]);
}

#[test]
fn pass_through_output_is_bit_identical_to_source() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = CaptureConfiguration {
        encoder: EncoderKind::PassThrough,
        destination: dir.path().join("recording.raw"),
        ..config(dir.path(), 0.75)
    };

    let (result, _) = capture(config, SimulatedInterface::new());
    let result = result.unwrap();

    assert_eq!(result.payload_bytes, 24_000);
    assert_eq!(result.file_bytes, 24_000);
    assert_eq!(
        fs::read(&result.file_path).unwrap(),
        SimulatedInterface::pattern(24_000)
    );
}

#[test]
fn short_hardware_reads_keep_capture_running_and_ordered() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let format = AudioFormat::new(16_000, 16, 2);
    let config = CaptureConfiguration {
        source: SourceConfig {
            format,
            frame_bytes: 256,
            ..SourceConfig::default()
        },
        write_metadata: true,
        ..config(dir.path(), 0.5)
    };

    let (result, _) = capture(config, SimulatedInterface::new().with_short_reads(3, 17));
    let result = result.unwrap();

    assert_eq!(result.payload_bytes, 32_000);
    assert!(result.metadata.diagnostics.short_reads > 0);

    let contents = fs::read(&result.file_path).unwrap();
    let header = parse_wav_header(&contents).unwrap();
    assert_eq!(header.channels, 2);
    assert_eq!(header.block_align, 4);
    assert_eq!(&contents[WAV_HEADER_SIZE..], &SimulatedInterface::pattern(32_000)[..]);

    let sidecar = read_metadata(&result.file_path).unwrap();
    assert_eq!(sidecar.checksum, result.checksum);
    assert_eq!(sidecar.payload_bytes, 32_000);
    assert_eq!(sidecar.container, EncoderKind::Wav);
}

#[test]
fn paced_capture_runs_in_real_time() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    let started = Instant::now();
    let (result, _) = capture(config(dir.path(), 0.3), SimulatedInterface::new().paced());
    let result = result.unwrap();

    assert_eq!(result.payload_bytes, 9600);
    assert!(started.elapsed() >= Duration::from_millis(250));
}

#[test]
fn stop_is_idempotent_after_capture() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let driver = CaptureDriver::new(config(dir.path(), 0.05)).unwrap();
    let hw = SimulatedInterface::new();
    let released = hw.release_flag();
    let mut graph = driver.build_graph(hw, None).unwrap();

    driver.run(&mut graph).unwrap();
    assert!(released.load(Ordering::SeqCst));

    graph.stop();
    graph.stop();
    assert_eq!(graph.state(), PipelineState::Stopped);
    assert!(matches!(graph.run(), Err(CaptureError::InvalidState { .. })));
}

struct FailingDestination {
    written: u64,
    capacity: u64,
}

impl CaptureDestination for FailingDestination {
    fn append(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        if self.written + bytes.len() as u64 > self.capacity {
            return Err(CaptureError::StorageError("no space left on device".into()));
        }
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }

    fn finalize(&mut self, _header: Option<&[u8]>) -> Result<String, CaptureError> {
        Ok(String::new())
    }
}

#[test]
fn storage_failure_stops_every_stage_and_releases_hardware() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let driver = CaptureDriver::new(config(dir.path(), 1.0)).unwrap();
    let hw = SimulatedInterface::new();
    let released = hw.release_flag();
    let mut graph = driver.build_graph(hw, None).unwrap();

    let mut destination = FailingDestination {
        written: 0,
        capacity: 5000,
    };
    let err = driver.run_into(&mut graph, &mut destination).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(graph.state(), PipelineState::Stopped);
    assert!(released.load(Ordering::SeqCst));
    assert!(destination.written <= 5000);
}

#[test]
fn hardware_failure_aborts_capture() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    let (result, state) = capture(config(dir.path(), 5.0), SimulatedInterface::new().failing_after(10));
    let err = result.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Hardware);
    assert_eq!(state, PipelineState::Stopped);
}

#[test]
fn unavailable_device_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let driver = CaptureDriver::new(config(dir.path(), 1.0)).unwrap();

    let err = driver
        .build_graph(SimulatedInterface::new().unavailable(), None)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Construction);
    assert!(!dir.path().join("recording.wav").exists());
}

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<PipelineState>>,
    short_reads: Mutex<usize>,
    finished: Mutex<Option<RecordingResult>>,
}

impl PipelineObserver for Recorder {
    fn on_state_changed(&self, state: PipelineState) {
        self.states.lock().push(state);
    }

    fn on_event(&self, event: &PipelineEvent) {
        if matches!(event, PipelineEvent::ShortRead { .. }) {
            *self.short_reads.lock() += 1;
        }
    }

    fn on_capture_finished(&self, result: &RecordingResult) {
        *self.finished.lock() = Some(result.clone());
    }
}

#[test]
fn observer_follows_the_whole_session() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let driver = CaptureDriver::new(config(dir.path(), 0.2)).unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut graph = driver
        .build_graph(
            SimulatedInterface::new().with_short_reads(4, 8),
            Some(recorder.clone() as Arc<dyn PipelineObserver>),
        )
        .unwrap();

    let result = driver.run(&mut graph).unwrap();

    assert_eq!(
        *recorder.states.lock(),
        vec![
            PipelineState::Linked,
            PipelineState::Running,
            PipelineState::Draining,
            PipelineState::Stopped,
        ]
    );
    assert!(*recorder.short_reads.lock() > 0);
    assert_eq!(recorder.finished.lock().as_ref(), Some(&result));
}

#[test]
fn configuration_file_drives_capture() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("capture.json");
    let destination = dir.path().join("from_file.raw");
    let json = serde_json::json!({
        "duration_secs": 0.1,
        "destination": &destination,
        "encoder": "pass_through",
        "source": { "format": { "sample_rate": 48000, "bits_per_sample": 16,
                                "channel_count": 1, "channel_mask": 1 },
                    "frame_bytes": 480 }
    });
    fs::write(&config_path, json.to_string()).unwrap();

    let config = CaptureConfiguration::from_json_file(&config_path).unwrap();
    let (result, _) = capture(config, SimulatedInterface::new());

    assert_eq!(result.unwrap().file_bytes, 9600);
    assert_eq!(fs::read(&destination).unwrap().len(), 9600);
}
