pub mod encoder;
pub mod ring_buffer;
pub mod wav_format;
