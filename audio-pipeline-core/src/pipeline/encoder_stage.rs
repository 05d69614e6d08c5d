use crate::models::audio_models::AudioFormat;
use crate::models::config::EncoderKind;
use crate::models::error::CaptureError;
use crate::pipeline::stage::{Flow, ReadOutcome, Stage, StageIo, StageRole};
use crate::processing::encoder::{build_encoder, Container, FrameEncoder};

/// Format packaging stage.
///
/// Emits the encoder's header exactly once, before any payload, then pops
/// PCM from its input, encodes it and pushes the result in arrival order.
pub struct EncoderStage {
    encoder: Box<dyn FrameEncoder>,
    header_sent: bool,
    input: Vec<u8>,
    encoded: Vec<u8>,
}

impl EncoderStage {
    pub fn new(encoder: Box<dyn FrameEncoder>, chunk_bytes: usize) -> Self {
        let chunk_bytes = chunk_bytes.max(1);
        Self {
            encoder,
            header_sent: false,
            input: vec![0; chunk_bytes],
            encoded: Vec::with_capacity(chunk_bytes),
        }
    }

    /// Stage for the encoder selected by `kind`. See [`build_encoder`].
    pub fn with_kind(
        kind: EncoderKind,
        format: AudioFormat,
        declared_len: Option<u64>,
        chunk_bytes: usize,
    ) -> Result<Self, CaptureError> {
        Ok(Self::new(build_encoder(kind, format, declared_len)?, chunk_bytes))
    }
}

impl Stage for EncoderStage {
    fn role(&self) -> StageRole {
        StageRole::Transform
    }

    fn process(&mut self, io: &mut StageIo) -> Result<Flow, CaptureError> {
        if !self.header_sent {
            self.header_sent = true;
            let header = self.encoder.header();
            if !header.is_empty() {
                log::debug!("[{}] emitting {}-byte header", io.tag(), header.len());
                if io.write_all(&header)? == Flow::Finished {
                    return Ok(Flow::Finished);
                }
            }
        }

        let n = match io.read(&mut self.input)? {
            ReadOutcome::Data(n) => n,
            ReadOutcome::Idle => return Ok(Flow::Continue),
            ReadOutcome::Closed => return Ok(Flow::Finished),
        };

        self.encoded.clear();
        self.encoder.encode(&self.input[..n], &mut self.encoded)?;
        let encoded = self.encoded.len() as u64;
        io.count(|d| d.encoded_bytes += encoded);
        io.write_all(&self.encoded)
    }

    fn container(&self) -> Option<Container> {
        Some(self.encoder.container())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::PipelineShared;
    use crate::processing::ring_buffer::{RingBuffer, Timeout};
    use crate::processing::wav_format::{parse_wav_header, WAV_HEADER_SIZE};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    fn linked_io(input: &Arc<RingBuffer>, output: &Arc<RingBuffer>) -> StageIo {
        let timeout = Timeout::After(Duration::from_millis(10));
        StageIo::new(
            "wav",
            Some(Arc::clone(input)),
            Some(Arc::clone(output)),
            Arc::new(AtomicBool::new(true)),
            timeout,
            timeout,
            20,
            Arc::new(PipelineShared::new(None)),
        )
    }

    fn run_to_end(stage: &mut EncoderStage, io: &mut StageIo) {
        while stage.process(io).unwrap() == Flow::Continue {}
    }

    #[test]
    fn header_precedes_payload_exactly_once() {
        let input = Arc::new(RingBuffer::new(64));
        let output = Arc::new(RingBuffer::new(256));
        let mut io = linked_io(&input, &output);
        let format = AudioFormat::default();
        let mut stage = EncoderStage::with_kind(EncoderKind::Wav, format, Some(8), 4).unwrap();

        input.push(&[1, 2, 3, 4, 5, 6, 7, 8], Timeout::NonBlocking).unwrap();
        input.close();
        run_to_end(&mut stage, &mut io);

        let out = output.pop(256, Timeout::NonBlocking).unwrap();
        assert_eq!(out.len(), WAV_HEADER_SIZE + 8);
        assert_eq!(parse_wav_header(&out).unwrap().data_size, 8);
        assert_eq!(&out[WAV_HEADER_SIZE..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(stage.container(), Some(Container::Wav(format)));
    }

    #[test]
    fn pass_through_forwards_bytes_unchanged() {
        let input = Arc::new(RingBuffer::new(64));
        let output = Arc::new(RingBuffer::new(64));
        let mut io = linked_io(&input, &output);
        let mut stage =
            EncoderStage::with_kind(EncoderKind::PassThrough, AudioFormat::default(), None, 3)
                .unwrap();

        let data: Vec<u8> = (0..20).collect();
        input.push(&data, Timeout::NonBlocking).unwrap();
        input.close();
        run_to_end(&mut stage, &mut io);

        assert_eq!(output.pop(64, Timeout::NonBlocking).unwrap(), data);
    }

    #[test]
    fn idle_input_keeps_stage_running() {
        let input = Arc::new(RingBuffer::new(8));
        let output = Arc::new(RingBuffer::new(8));
        let mut io = linked_io(&input, &output);
        let mut stage =
            EncoderStage::with_kind(EncoderKind::PassThrough, AudioFormat::default(), None, 4)
                .unwrap();

        assert_eq!(stage.process(&mut io).unwrap(), Flow::Continue);
        assert!(output.is_empty());
    }
}
