use std::path::Path;

use crate::models::error::CaptureError;

/// Where the capture driver appends the bytes it drains from the sink.
///
/// Writes are append-only; the only rewrite allowed is the container header
/// at the very start, supplied to `finalize` once the payload length is known.
pub trait CaptureDestination {
    fn append(&mut self, bytes: &[u8]) -> Result<(), CaptureError>;

    /// Total bytes appended so far.
    fn bytes_written(&self) -> u64;

    /// Overwrite the leading bytes with `header` (if any), flush to durable
    /// storage, close, and return the SHA-256 hex digest of the contents.
    fn finalize(&mut self, header: Option<&[u8]>) -> Result<String, CaptureError>;

    /// Backing file, for destinations that have one.
    fn path(&self) -> Option<&Path> {
        None
    }
}
