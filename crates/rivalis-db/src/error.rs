use rivalis_types::models::Stream;
use thiserror::Error;

/// Failures surfaced by the event store. Both are terminal for the single
/// operation; nothing in the store retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("write to {stream} stream failed: {reason}")]
    WriteFailure { stream: Stream, reason: String },

    #[error("read from {stream} stream failed: {reason}")]
    ReadFailure { stream: Stream, reason: String },
}

impl StoreError {
    pub fn write(stream: Stream, err: impl std::fmt::Display) -> Self {
        Self::WriteFailure { stream, reason: format!("{:#}", err) }
    }

    pub fn read(stream: Stream, err: impl std::fmt::Display) -> Self {
        Self::ReadFailure { stream, reason: format!("{:#}", err) }
    }

    pub fn stream(&self) -> Stream {
        match self {
            Self::WriteFailure { stream, .. } | Self::ReadFailure { stream, .. } => *stream,
        }
    }
}
