use thiserror::Error;

/// Broad classification of a [`CaptureError`], used by callers to decide
/// how to report a failed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Misconfigured peripheral, unmounted storage, or an unlinked graph.
    Construction,
    /// The audio interface failed while the pipeline was running.
    Hardware,
    /// The destination could not be created, written, or finalized.
    Storage,
    /// Data stopped flowing for longer than the configured limit.
    Stall,
    /// The container encoder rejected the stream.
    Encoding,
    /// An operation was issued in the wrong lifecycle state.
    State,
}

/// Fatal errors surfaced by the capture pipeline.
///
/// Transient conditions (short hardware reads, single push/pop timeouts)
/// never produce a `CaptureError`; they are absorbed by the stage that
/// sees them and reported through
/// [`PipelineObserver`](crate::traits::observer::PipelineObserver).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("link failed: {0}")]
    LinkFailed(String),

    #[error("invalid state: cannot {action} while {state}")]
    InvalidState { action: String, state: String },

    #[error("hardware error: {0}")]
    HardwareError(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("storage not mounted: {0}")]
    StorageUnavailable(String),

    #[error("stage '{tag}' failed: {reason}")]
    StageFailed { tag: String, reason: String },

    #[error("timeout")]
    Timeout,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceNotAvailable(_)
            | Self::ConfigurationFailed(_)
            | Self::LinkFailed(_)
            | Self::StorageUnavailable(_) => ErrorKind::Construction,
            Self::InvalidState { .. } => ErrorKind::State,
            Self::HardwareError(_) | Self::StageFailed { .. } => ErrorKind::Hardware,
            Self::EncodingFailed(_) => ErrorKind::Encoding,
            Self::StorageError(_) => ErrorKind::Storage,
            Self::Timeout => ErrorKind::Stall,
        }
    }

    pub(crate) fn invalid_state(action: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }
}

/// Outcome of a ring buffer transfer that moved no bytes.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("ring buffer operation timed out")]
    TimedOut,

    #[error("ring buffer closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_errors_are_classified() {
        assert_eq!(
            CaptureError::LinkFailed("dangling".into()).kind(),
            ErrorKind::Construction
        );
        assert_eq!(
            CaptureError::StorageUnavailable("/sdcard".into()).kind(),
            ErrorKind::Construction
        );
        assert_eq!(
            CaptureError::StorageError("disk full".into()).kind(),
            ErrorKind::Storage
        );
        assert_eq!(CaptureError::Timeout.kind(), ErrorKind::Stall);
    }

    #[test]
    fn invalid_state_display() {
        let err = CaptureError::invalid_state("run", "stopped");
        assert_eq!(err.to_string(), "invalid state: cannot run while stopped");
    }
}
