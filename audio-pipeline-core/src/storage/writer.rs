use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::traits::destination::CaptureDestination;

/// Append-only recording file.
///
/// ## File Format
///
/// ```text
/// [container header, rewritten on finalize]
/// [payload bytes in capture order...]
/// ```
///
/// Creating the writer replaces any file already at the path; a recording is
/// never appended to an old one. Dropping an unfinalized writer flushes and
/// closes the partial file.
pub struct CaptureFileWriter {
    file_path: PathBuf,
    file: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl CaptureFileWriter {
    /// Create `path`, deleting whatever was there. The parent directory
    /// must already exist.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let file_path = path.into();

        match fs::remove_file(&file_path) {
            Ok(()) => log::info!("replaced existing file {}", file_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CaptureError::StorageError(format!(
                    "failed to remove existing {}: {}",
                    file_path.display(),
                    e
                )))
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .map_err(|e| {
                CaptureError::StorageError(format!(
                    "failed to create {}: {}",
                    file_path.display(),
                    e
                ))
            })?;

        log::debug!("opened {} for capture", file_path.display());
        Ok(Self {
            file_path,
            file: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl CaptureDestination for CaptureFileWriter {
    fn append(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        file.write_all(bytes)
            .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn finalize(&mut self, header: Option<&[u8]>) -> Result<String, CaptureError> {
        let writer = self
            .file
            .take()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        let mut file = writer
            .into_inner()
            .map_err(|e| CaptureError::StorageError(format!("flush failed: {}", e.error())))?;

        if let Some(header) = header {
            if header.len() as u64 > self.bytes_written {
                return Err(CaptureError::StorageError(format!(
                    "{}-byte header does not fit a {}-byte file",
                    header.len(),
                    self.bytes_written
                )));
            }
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.write_all(header))
                .map_err(|e| CaptureError::StorageError(format!("header rewrite failed: {}", e)))?;
        }

        file.sync_all()
            .map_err(|e| CaptureError::StorageError(format!("sync failed: {}", e)))?;
        drop(file);

        log::info!(
            "closed {} ({} bytes)",
            self.file_path.display(),
            self.bytes_written
        );
        sha256_file(&self.file_path)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.file_path)
    }
}

impl Drop for CaptureFileWriter {
    fn drop(&mut self) {
        if let Some(mut writer) = self.file.take() {
            if let Err(e) = writer.flush() {
                log::warn!("failed to flush {}: {}", self.file_path.display(), e);
            }
            log::warn!(
                "closed unfinished recording {} after {} bytes",
                self.file_path.display(),
                self.bytes_written
            );
        }
    }
}

/// SHA-256 hex digest of a file, streamed rather than read into memory.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path).map_err(|e| {
        CaptureError::StorageError(format!("failed to open file for checksum: {}", e))
    })?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
